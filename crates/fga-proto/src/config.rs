//! Process-wide configuration.
//!
//! Loaded from a host `config_get(key) -> Option<String>` callback (see
//! `fga_core::host::HostEnv`); this module only owns parsing, defaults and
//! validation, not the lookup mechanism itself.

use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_MAX_SLOTS: usize = 1024;
const MIN_MAX_SLOTS: usize = 1024;
const MAX_MAX_SLOTS: usize = 16384;
const MAX_RELATIONS: usize = 64;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected {expected}, got {value:?}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("relations: at most {MAX_RELATIONS} relations may be registered (got {count})")]
    TooManyRelations { count: usize },
}

/// Typed, validated process-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FgaConfig {
    pub endpoint: String,
    pub store_id: Option<String>,
    pub authorization_model_id: Option<String>,
    pub cache_ttl_ms: u64,
    pub cache_size_mb: u64,
    pub max_cache_entries: Option<u64>,
    pub max_slots: usize,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_ms: u64,
    pub relations: Vec<String>,
    pub worker_threads: usize,
    pub fallback_to_grpc_on_miss: bool,
}

impl Default for FgaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8081".to_string(),
            store_id: None,
            authorization_model_id: None,
            cache_ttl_ms: 10_000,
            cache_size_mb: 64,
            max_cache_entries: None,
            max_slots: DEFAULT_MAX_SLOTS,
            max_concurrency: 16,
            max_retries: 2,
            initial_backoff_ms: 20,
            max_backoff_ms: 500,
            timeout_ms: 1_000,
            relations: Vec::new(),
            worker_threads: 4,
            fallback_to_grpc_on_miss: true,
        }
    }
}

impl FgaConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Builds a config from a flat string map, the shape a `HostEnv::config_get`
    /// lookup naturally produces once the host has resolved every dotted key.
    /// Unknown keys are ignored (forward compatibility); missing keys fall back
    /// to [`FgaConfig::default`].
    pub fn from_map(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = values.get("endpoint") {
            config.endpoint = v.clone();
        }
        if let Some(v) = values.get("store_id") {
            config.store_id = Some(v.clone());
        }
        if let Some(v) = values.get("authorization_model_id") {
            config.authorization_model_id = Some(v.clone());
        }
        config.cache_ttl_ms = parse_u64(values, "cache_ttl_ms", config.cache_ttl_ms)?;
        config.cache_size_mb = parse_u64(values, "cache_size_mb", config.cache_size_mb)?;
        if let Some(v) = values.get("max_cache_entries") {
            config.max_cache_entries = Some(parse_value(v, "max_cache_entries")?);
        }
        config.max_slots = clamp_max_slots(parse_usize(
            values,
            "max_slots",
            config.max_slots,
        )?);
        config.max_concurrency = parse_usize(values, "max_concurrency", config.max_concurrency)?;
        config.max_retries = parse_value_or(values, "max_retries", config.max_retries)?;
        config.initial_backoff_ms =
            parse_u64(values, "initial_backoff_ms", config.initial_backoff_ms)?;
        config.max_backoff_ms = parse_u64(values, "max_backoff_ms", config.max_backoff_ms)?;
        config.timeout_ms = parse_u64(values, "timeout_ms", config.timeout_ms)?;
        config.worker_threads = parse_usize(values, "worker_threads", config.worker_threads)?;
        if let Some(v) = values.get("fallback_to_grpc_on_miss") {
            config.fallback_to_grpc_on_miss = parse_value(v, "fallback_to_grpc_on_miss")?;
        }
        if let Some(v) = values.get("relations") {
            let relations: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if relations.len() > MAX_RELATIONS {
                return Err(ConfigError::TooManyRelations {
                    count: relations.len(),
                });
            }
            config.relations = relations;
        }

        Ok(config)
    }

    /// Bit index for a relation registered via the `relations` option, used
    /// to pack relation membership into a bitmask elsewhere in the core.
    /// `None` if the relation wasn't registered or registration was skipped
    /// (more than 63 relations configured).
    pub fn relation_bit(&self, relation: &str) -> Option<u32> {
        self.relations
            .iter()
            .position(|r| r == relation)
            .map(|i| i as u32)
    }
}

fn clamp_max_slots(requested: usize) -> usize {
    requested.clamp(MIN_MAX_SLOTS, MAX_MAX_SLOTS)
}

fn parse_value<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        expected: std::any::type_name::<T>(),
        value: value.to_string(),
    })
}

fn parse_value_or<T: std::str::FromStr>(
    values: &BTreeMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match values.get(key) {
        Some(v) => parse_value(v, key),
        None => Ok(default),
    }
}

fn parse_u64(
    values: &BTreeMap<String, String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    parse_value_or(values, key, default)
}

fn parse_usize(
    values: &BTreeMap<String, String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    parse_value_or(values, key, default)
}
