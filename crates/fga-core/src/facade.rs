//! Public facade: the entry point a query worker calls.
//!
//! Every read goes L1 (per-worker, private) -> L2 (shared) -> the channel,
//! in that order; a hit at any stage short-circuits the ones below it. A
//! write always goes through the channel, then bumps the affected object's
//! generation so a subsequent `check` can't observe the old answer through
//! either cache tier, making a write-then-check reflect immediately.
//!
//! There is no separate `shmem_size`/`shmem_init` pair here: this crate
//! models shared state as `Arc`-owned Rust structs rather than an actual
//! shmem segment, so [`Fga::new`] does what a host's size-then-init
//! handshake would do, in one step.

use crate::error::{FgaError, FgaErrorKind};
use crate::host::{HostEnv, LatchId};
use crate::stats::Stats;
use fga_cache::{GenerationRegistry, L1Cache, L2Cache, Scope};
use fga_channel::Channel;
use fga_proto::{CacheKey, FgaConfig, RequestVariant, Response, ResponseBody, ResponseStatus, Tuple};
use fga_transport::{Dispatcher, HttpRawTransport, RawTransport, RetryPolicy, TransportClient};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consumer::ConsumerLoop;

const L2_ENTRY_BYTES: usize = 64;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as u64
}

/// Applies `check`'s fallback policy to a dispatch error: by default
/// (`fallback_to_grpc_on_miss == true`) the error
/// propagates unchanged; with it turned off, a backend outage or
/// server-side failure degrades to `Ok(false)` (deny) instead. Every other
/// error kind (client error, cancellation, queue exhaustion) always
/// propagates — there's no "miss" to fall back to for a malformed request.
fn check_fallback_outcome(err: FgaError, fallback_to_grpc_on_miss: bool) -> Result<bool, FgaError> {
    match err {
        FgaError::TransportError(_) | FgaError::ServerError(_) if !fallback_to_grpc_on_miss => Ok(false),
        other => Err(other),
    }
}

/// The pipeline's public handle. One instance per process; cloned cheaply
/// (everything inside is `Arc`-shared) so every worker can hold its own
/// handle while sharing the L2 cache, generation registry and channel.
#[derive(Clone)]
pub struct Fga {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn HostEnv>,
    channel: Arc<Channel>,
    l2: Arc<L2Cache>,
    generations: Arc<GenerationRegistry>,
    config: FgaConfig,
    stats: Arc<Stats>,
    next_request_id: AtomicU64,
    consumer: parking_lot::Mutex<Option<ConsumerLoop>>,
}

impl Fga {
    /// Builds the pipeline and starts its consumer loop. `runtime` is the
    /// `tokio` handle that RPC dispatch runs on; the caller owns the runtime
    /// itself — this crate never constructs one, since the consumer loop is
    /// not itself async.
    pub fn new(config: FgaConfig, host: Arc<dyn HostEnv>, runtime: tokio::runtime::Handle) -> Self {
        let l2_capacity = config
            .max_cache_entries
            .map(|n| n as usize)
            .unwrap_or_else(|| ((config.cache_size_mb as usize) * 1024 * 1024 / L2_ENTRY_BYTES).max(1));
        let l2 = Arc::new(L2Cache::new(l2_capacity));
        let generations = Arc::new(GenerationRegistry::new());
        let channel = Arc::new(Channel::new(config.max_slots, host.latch_handle(LatchId::Consumer)));
        let stats = Arc::new(Stats::default());

        let raw: Arc<dyn RawTransport> = Arc::new(HttpRawTransport::new(config.endpoint.clone()));
        let retry = RetryPolicy::new(config.max_retries, config.initial_backoff(), config.max_backoff());
        let transport = TransportClient::new(raw, retry, config.timeout(), config.max_concurrency);
        let dispatcher = Arc::new(Dispatcher::new(transport, &config));

        let consumer = ConsumerLoop::spawn(
            Arc::clone(&channel),
            dispatcher,
            Arc::clone(&host),
            Arc::clone(&stats),
            runtime,
        );

        Self {
            inner: Arc::new(Inner {
                host,
                channel,
                l2,
                generations,
                config,
                stats,
                next_request_id: AtomicU64::new(1),
                consumer: parking_lot::Mutex::new(Some(consumer)),
            }),
        }
    }

    pub fn config(&self) -> &FgaConfig {
        &self.inner.config
    }

    /// Checks one tuple. `l1` is the calling worker's own cache (private to
    /// a single worker) — callers own it and pass it in
    /// rather than this crate holding one per thread, since this crate has
    /// no notion of "the current worker" on its own.
    pub fn check(
        &self,
        l1: &mut L1Cache,
        worker_id: u64,
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    ) -> Result<bool, FgaError> {
        tuple.validate()?;
        let inner = &*self.inner;
        let resolved_store = store_id
            .as_deref()
            .or(inner.config.store_id.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FgaError::ClientError("no store_id on request and no default configured".into()))?;
        let resolved_model = model_id.as_deref().or(inner.config.authorization_model_id.as_deref());

        let key = CacheKey::new(
            resolved_store,
            resolved_model,
            &tuple.object_type,
            &tuple.object_id,
            &tuple.subject_type,
            &tuple.subject_id,
            &tuple.relation,
        );
        let object_scope = Scope::object(&tuple.object_type, &tuple.object_id);
        let generation = inner.generations.current(&object_scope);
        let now = now_ms();

        if let Some(allowed) = l1.lookup(&key, generation, now) {
            inner.stats.record_l1_hit();
            return Ok(allowed);
        }
        inner.stats.record_l1_miss();

        if let Some(allowed) = inner.l2.lookup(&key, generation, now) {
            l1.store(&key, generation, now + inner.config.cache_ttl_ms, allowed);
            return Ok(allowed);
        }

        let request = RequestVariant::CheckTuple {
            store_id: Some(resolved_store.to_string()),
            model_id: resolved_model.map(str::to_string),
            tuple,
        };
        match self.dispatch(worker_id, request) {
            Ok(response) => match response.body {
                ResponseBody::CheckTuple { allowed } => {
                    let expires_at = now_ms() + inner.config.cache_ttl_ms;
                    inner.l2.store(&key, generation, now, expires_at, allowed);
                    l1.store(&key, generation, expires_at, allowed);
                    Ok(allowed)
                }
                _ => unreachable!("CheckTuple request always yields a CheckTuple body on Ok"),
            },
            Err(e) => match check_fallback_outcome(e, inner.config.fallback_to_grpc_on_miss) {
                Ok(denied) => {
                    inner.host.log(
                        crate::host::LogLevel::Warning,
                        "fga",
                        "check failed; fallback_to_grpc_on_miss is off, denying",
                    );
                    Ok(denied)
                }
                Err(e) => Err(e),
            },
        }
    }

    pub fn write_tuple(
        &self,
        worker_id: u64,
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    ) -> Result<(), FgaError> {
        tuple.validate()?;
        let scope = Scope::object(&tuple.object_type, &tuple.object_id);
        let request = RequestVariant::WriteTuple { store_id, model_id, tuple };
        self.dispatch(worker_id, request)?;
        self.bump_and_handle_wrap(&scope);
        Ok(())
    }

    pub fn delete_tuple(
        &self,
        worker_id: u64,
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    ) -> Result<(), FgaError> {
        tuple.validate()?;
        let scope = Scope::object(&tuple.object_type, &tuple.object_id);
        let request = RequestVariant::DeleteTuple { store_id, model_id, tuple };
        self.dispatch(worker_id, request)?;
        self.bump_and_handle_wrap(&scope);
        Ok(())
    }

    pub fn get_store(&self, worker_id: u64, store_id: Option<String>) -> Result<(bool, String), FgaError> {
        let response = self.dispatch(worker_id, RequestVariant::GetStore { store_id })?;
        match response.body {
            ResponseBody::GetStore { found, name } => Ok((found, name)),
            _ => unreachable!("GetStore request always yields a GetStore body on Ok"),
        }
    }

    pub fn create_store(&self, worker_id: u64, name: String) -> Result<(String, String), FgaError> {
        let response = self.dispatch(worker_id, RequestVariant::CreateStore { name })?;
        match response.body {
            ResponseBody::CreateStore { id, name } => Ok((id, name)),
            _ => unreachable!("CreateStore request always yields a CreateStore body on Ok"),
        }
    }

    /// Deletes a store and bumps the global generation — a deleted store can
    /// invalidate checks across every object it owned, and there is no
    /// narrower scope available to target.
    pub fn delete_store(&self, worker_id: u64, store_id: String) -> Result<(), FgaError> {
        self.dispatch(worker_id, RequestVariant::DeleteStore { store_id })?;
        self.bump_and_handle_wrap(&Scope::Global);
        Ok(())
    }

    /// Bumps `scope`'s generation and, if the 16-bit counter just wrapped,
    /// eagerly purges L2 entries tagged with the reused generation number —
    /// otherwise a stale entry from an earlier cycle could alias the new
    /// counter value and lazy invalidation would never trip, producing a
    /// false hit on generation wraparound.
    ///
    /// This only reaches the shared L2 tier. A wrap can't reach every
    /// worker's private L1 cache from here — there's no channel back to
    /// them — so an L1 entry aliased by a wrap is cleared by its own TTL
    /// instead; `cache_ttl_ms` bounds how long that window can last, and an
    /// L1 set only holds two ways, so in practice a stale entry surviving
    /// 65535 bumps of its scope without being evicted or expired is not a
    /// realistic outcome.
    fn bump_and_handle_wrap(&self, scope: &Scope) {
        let bump = self.inner.generations.bump(scope);
        if bump.wrapped {
            self.inner.l2.invalidate_by_generation(bump.generation);
        }
    }

    pub fn stats(&self) -> Vec<(&'static str, u64)> {
        self.inner.stats.rows(&self.inner.l2)
    }

    /// Rough byte estimate of this instance's shared-state footprint, the
    /// host-facing analogue of a real extension's `shmem_size` hook.
    pub fn shmem_size(&self) -> usize {
        let inner = &*self.inner;
        let slot_bytes = inner.channel.capacity() * std::mem::size_of::<fga_proto::Response>();
        let l2_bytes = inner.l2.capacity() * L2_ENTRY_BYTES;
        slot_bytes + l2_bytes
    }

    /// Stops accepting new work, drains in-flight dispatches, and joins the
    /// consumer thread. Idempotent — a second call is a no-op.
    pub fn shutdown(&self) {
        if let Some(consumer) = self.inner.consumer.lock().take() {
            consumer.shutdown();
        }
    }

    fn dispatch(&self, worker_id: u64, request: RequestVariant) -> Result<Response, FgaError> {
        let inner = &*self.inner;
        let request_id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);

        let slot_index = inner.channel.acquire()?;
        inner.channel.slot(slot_index).fill_request(worker_id, request_id, request);
        inner.channel.enqueue(slot_index)?;
        inner.channel.signal_consumer();

        let producer_latch = inner.host.latch_handle(LatchId::Producer(worker_id));
        let response = inner.channel.wait_for_completion(
            slot_index,
            producer_latch.as_ref(),
            Some(inner.config.timeout()),
            || false,
        );
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                inner.stats.record_cancellation();
                return Err(e.into());
            }
        };

        // Errors propagate as-is here; `check` is the only caller that
        // downgrades a TransportError/ServerError to "deny", and it does so
        // after inspecting the error, not inside this shared dispatch path
        // — every other operation (write/delete/store management) has no
        // boolean "miss" to fall back to.
        match FgaErrorKind::from(response.status) {
            FgaErrorKind::None => Ok(response),
            FgaErrorKind::ClientError => Err(FgaError::ClientError(
                response.error_message.unwrap_or_default(),
            )),
            FgaErrorKind::TransportError => Err(FgaError::TransportError(
                response.error_message.unwrap_or_default(),
            )),
            FgaErrorKind::ServerError => Err(FgaError::ServerError(
                response.error_message.unwrap_or_default(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StdHostEnv;
    use std::collections::BTreeMap;

    // `Fga::new` always wires a real `HttpRawTransport`; there's no seam to
    // inject `AlwaysAllow` through the public constructor. These unit tests
    // only exercise paths that never reach the transport (an L1 hit, and a
    // client error rejected before dispatch); the transport-reaching path is
    // covered by `tests/integration.rs`, which builds the pipeline's pieces
    // by hand with a test `RawTransport`.
    fn fga_with(rt: &tokio::runtime::Runtime) -> Fga {
        let config = FgaConfig {
            store_id: Some("s1".into()),
            max_slots: 1024,
            timeout_ms: 2_000,
            endpoint: "http://unused.invalid".into(),
            ..FgaConfig::default()
        };
        let host: Arc<dyn HostEnv> = Arc::new(StdHostEnv::new(BTreeMap::new()));
        Fga::new(config, host, rt.handle().clone())
    }

    #[test]
    fn l1_hit_short_circuits_everything_below_it() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fga = fga_with(&rt);
        let mut l1 = L1Cache::new();
        let key = CacheKey::new("s1", None, "doc", "budget", "user", "alice", "reader");
        l1.store(&key, 0, now_ms() + 60_000, true);

        let tuple = Tuple::new("doc", "budget", "reader", "user", "alice").unwrap();
        let allowed = fga.check(&mut l1, 1, None, None, tuple).unwrap();
        assert!(allowed);
        assert_eq!(fga.stats().into_iter().find(|(k, _)| *k == "l1_hits").unwrap().1, 1);

        fga.shutdown();
    }

    #[test]
    fn missing_store_id_is_a_client_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let host: Arc<dyn HostEnv> = Arc::new(StdHostEnv::new(BTreeMap::new()));
        let fga = Fga::new(FgaConfig::default(), host, rt.handle().clone());
        let mut l1 = L1Cache::new();
        let tuple = Tuple::new("doc", "budget", "reader", "user", "alice").unwrap();
        let err = fga.check(&mut l1, 1, None, None, tuple).unwrap_err();
        assert!(matches!(err, FgaError::ClientError(_)));
        fga.shutdown();
    }

    #[test]
    fn fallback_off_downgrades_transport_and_server_errors_to_deny() {
        assert_eq!(check_fallback_outcome(FgaError::TransportError("down".into()), false).unwrap(), false);
        assert_eq!(check_fallback_outcome(FgaError::ServerError("500".into()), false).unwrap(), false);
    }

    #[test]
    fn fallback_on_propagates_transport_and_server_errors() {
        assert!(matches!(
            check_fallback_outcome(FgaError::TransportError("down".into()), true),
            Err(FgaError::TransportError(_))
        ));
        assert!(matches!(
            check_fallback_outcome(FgaError::ServerError("500".into()), true),
            Err(FgaError::ServerError(_))
        ));
    }

    #[test]
    fn generation_wrap_eagerly_purges_aliased_l2_entries() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fga = fga_with(&rt);
        let scope = Scope::object("doc", "budget");
        let key = CacheKey::new("s1", None, "doc", "budget", "user", "alice", "reader");

        // Plant an L2 entry under generation 1, as if written long before the
        // scope's counter wrapped back around to 1.
        fga.inner.l2.store(&key, 1, now_ms(), now_ms() + 60_000, true);
        assert_eq!(fga.inner.l2.lookup(&key, 1, now_ms()), Some(true));

        // Force the scope's counter to the brink, then bump past it.
        for _ in 0..u16::MAX {
            fga.inner.generations.bump(&scope);
        }
        fga.bump_and_handle_wrap(&scope);
        assert_eq!(fga.inner.generations.current(&scope), 1, "counter wrapped back to 1");

        // Without eager invalidation this would false-hit: stored generation
        // 1 now equals the wrapped-around current generation 1.
        assert_eq!(
            fga.inner.l2.lookup(&key, 1, now_ms()),
            None,
            "aliased entry must be purged on wrap, not returned as a hit"
        );

        fga.shutdown();
    }

    #[test]
    fn client_errors_always_propagate_regardless_of_fallback_setting() {
        assert!(matches!(
            check_fallback_outcome(FgaError::ClientError("bad tuple".into()), false),
            Err(FgaError::ClientError(_))
        ));
    }
}
