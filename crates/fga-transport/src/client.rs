//! Transport client: wraps a single persistent connection to the remote
//! authorization service. One operation per request variant, each async,
//! each subject to a per-call deadline, a retry/backoff policy, an
//! in-flight concurrency cap and a health-tracking circuit breaker.
//!
//! The remote service speaks an OpenFGA-style REST API (`reqwest`'s `json`
//! feature, matching the HTTP-client stack the rest of this pack reaches
//! for) rather than gRPC; the usual channel-state health check
//! ("healthy iff Ready, Idle, Connecting") is modeled here as "no open
//! circuit and the last connectivity probe succeeded."

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::TransportError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use fga_proto::Tuple;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Serialize)]
struct TupleKey<'a> {
    user: String,
    relation: &'a str,
    object: String,
}

impl<'a> TupleKey<'a> {
    fn from_tuple(t: &'a Tuple) -> Self {
        Self {
            user: format!("{}:{}", t.subject_type, t.subject_id),
            relation: &t.relation,
            object: format!("{}:{}", t.object_type, t.object_id),
        }
    }
}

#[derive(Serialize)]
struct CheckRequestBody<'a> {
    tuple_key: TupleKey<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct CheckResponseBody {
    allowed: bool,
}

#[derive(Serialize)]
struct BatchCheckRequestBody<'a> {
    checks: Vec<TupleKey<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct BatchCheckResult {
    allowed: Option<bool>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BatchCheckResponseBody {
    results: Vec<BatchCheckResult>,
}

#[derive(Serialize)]
struct WriteRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Serialize)]
struct TupleKeys<'a> {
    tuple_keys: Vec<TupleKey<'a>>,
}

#[derive(Serialize)]
struct CreateStoreBody<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct StoreBody {
    id: String,
    name: String,
}

/// One-shot (no retry, no circuit breaker) wire-level call per variant. The
/// object-safe seam [`RawTransport`] is implemented once for real HTTP and
/// once for tests with a canned/failing backend.
#[async_trait]
pub trait RawTransport: Send + Sync {
    async fn check_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<bool, TransportError>;

    async fn write_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<(), TransportError>;

    async fn delete_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<(), TransportError>;

    async fn get_store(&self, store_id: &str, deadline: Duration) -> Result<(bool, String), TransportError>;

    async fn create_store(&self, name: &str, deadline: Duration) -> Result<(String, String), TransportError>;

    async fn delete_store(&self, store_id: &str, deadline: Duration) -> Result<(), TransportError>;

    /// Coalesced check for a homogeneous batch of `CheckTuple` requests;
    /// these may be coalesced into a single batched RPC. Default
    /// implementation falls back to one call per tuple; [`HttpRawTransport`]
    /// overrides it with a single batched POST.
    async fn check_tuple_batch(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuples: &[Tuple],
        deadline: Duration,
    ) -> Result<Vec<Result<bool, TransportError>>, TransportError> {
        let mut results = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            results.push(self.check_tuple(store_id, model_id, tuple, deadline).await);
        }
        Ok(results)
    }

    /// Cheap connectivity probe used by [`TransportClient::is_healthy`].
    async fn ping(&self, deadline: Duration) -> Result<(), TransportError>;
}

/// `reqwest`-backed [`RawTransport`] against an OpenFGA-style REST endpoint.
pub struct HttpRawTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRawTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
        deadline: Duration,
    ) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}{path}", self.endpoint);
        let mut req = self.http.request(method, url).timeout(deadline);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(TransportError::from_status(status, body))
        }
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::DeadlineExceeded
    } else if e.is_connect() {
        TransportError::Unavailable(e.to_string())
    } else {
        TransportError::Transport(e.to_string())
    }
}

#[async_trait]
impl RawTransport for HttpRawTransport {
    async fn check_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<bool, TransportError> {
        let body = CheckRequestBody {
            tuple_key: TupleKey::from_tuple(tuple),
            authorization_model_id: model_id,
        };
        let resp = self
            .send_json(reqwest::Method::POST, &format!("/stores/{store_id}/check"), Some(&body), deadline)
            .await?;
        let parsed: CheckResponseBody = resp
            .json()
            .await
            .map_err(|e| TransportError::Transport(e.to_string()))?;
        Ok(parsed.allowed)
    }

    async fn write_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let body = WriteRequestBody {
            writes: Some(TupleKeys {
                tuple_keys: vec![TupleKey::from_tuple(tuple)],
            }),
            deletes: None,
            authorization_model_id: model_id,
        };
        self.send_json::<WriteRequestBody>(reqwest::Method::POST, &format!("/stores/{store_id}/write"), Some(&body), deadline)
            .await?;
        Ok(())
    }

    async fn delete_tuple(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuple: &Tuple,
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let body = WriteRequestBody {
            writes: None,
            deletes: Some(TupleKeys {
                tuple_keys: vec![TupleKey::from_tuple(tuple)],
            }),
            authorization_model_id: model_id,
        };
        self.send_json::<WriteRequestBody>(reqwest::Method::POST, &format!("/stores/{store_id}/write"), Some(&body), deadline)
            .await?;
        Ok(())
    }

    async fn check_tuple_batch(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuples: &[Tuple],
        deadline: Duration,
    ) -> Result<Vec<Result<bool, TransportError>>, TransportError> {
        let body = BatchCheckRequestBody {
            checks: tuples.iter().map(TupleKey::from_tuple).collect(),
            authorization_model_id: model_id,
        };
        let resp = self
            .send_json(reqwest::Method::POST, &format!("/stores/{store_id}/batch-check"), Some(&body), deadline)
            .await?;
        let parsed: BatchCheckResponseBody = resp.json().await.map_err(|e| TransportError::Transport(e.to_string()))?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| match r.allowed {
                Some(allowed) => Ok(allowed),
                None => Err(TransportError::Internal(r.error.unwrap_or_default())),
            })
            .collect())
    }

    async fn get_store(&self, store_id: &str, deadline: Duration) -> Result<(bool, String), TransportError> {
        match self
            .send_json::<()>(reqwest::Method::GET, &format!("/stores/{store_id}"), None, deadline)
            .await
        {
            Ok(resp) => {
                let parsed: StoreBody = resp.json().await.map_err(|e| TransportError::Transport(e.to_string()))?;
                Ok((true, parsed.name))
            }
            Err(TransportError::NotFound(_)) => Ok((false, String::new())),
            Err(e) => Err(e),
        }
    }

    async fn create_store(&self, name: &str, deadline: Duration) -> Result<(String, String), TransportError> {
        let body = CreateStoreBody { name };
        let resp = self
            .send_json(reqwest::Method::POST, "/stores", Some(&body), deadline)
            .await?;
        let parsed: StoreBody = resp.json().await.map_err(|e| TransportError::Transport(e.to_string()))?;
        Ok((parsed.id, parsed.name))
    }

    async fn delete_store(&self, store_id: &str, deadline: Duration) -> Result<(), TransportError> {
        self.send_json::<()>(reqwest::Method::DELETE, &format!("/stores/{store_id}"), None, deadline)
            .await?;
        Ok(())
    }

    async fn ping(&self, deadline: Duration) -> Result<(), TransportError> {
        self.send_json::<()>(reqwest::Method::GET, "/healthz", None, deadline)
            .await?;
        Ok(())
    }
}

/// Retry/backoff, concurrency cap and circuit breaker layered over a
/// [`RawTransport`]. Exposes the same six operations; the dispatcher never
/// talks to `RawTransport` directly.
pub struct TransportClient {
    raw: Arc<dyn RawTransport>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    /// `None` when `max_concurrency == 0` (unbounded).
    inflight: Option<Semaphore>,
    timeout: Duration,
}

impl TransportClient {
    pub fn new(raw: Arc<dyn RawTransport>, retry: RetryPolicy, timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            raw,
            retry,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            inflight: (max_concurrency > 0).then(|| Semaphore::new(max_concurrency)),
            timeout,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self.breaker.state(), CircuitState::Open)
    }

    /// Runs `attempt` with retry/backoff, circuit-breaker gating and the
    /// in-flight cap. `attempt` is the one-shot call against `self.raw`.
    async fn with_resilience<T, F, Fut>(&self, mut attempt: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
    {
        let _permit = match &self.inflight {
            Some(sem) => match sem.try_acquire() {
                Ok(permit) => Some(permit),
                Err(_) => return Err(TransportError::ResourceExhausted),
            },
            None => None,
        };

        if !self.breaker.allow_request() {
            return Err(TransportError::CircuitOpen);
        }

        let max_attempts = self.retry.max_attempts();
        let mut last_err = None;
        for attempt_no in 0..max_attempts {
            if attempt_no > 0 {
                let backoff = self.retry.backoff_for_attempt(attempt_no);
                debug!(attempt = attempt_no, ?backoff, "retrying transport call");
                tokio::time::sleep(backoff).await;
            }
            match attempt().await {
                Ok(v) => {
                    self.breaker.record_success();
                    return Ok(v);
                }
                Err(e) if e.is_retryable() && attempt_no + 1 < max_attempts => {
                    warn!(error = %e, attempt = attempt_no, "transport call failed, retrying");
                    self.breaker.record_failure();
                    last_err = Some(e);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(TransportError::RetriesExhausted { attempts: max_attempts }))
    }

    pub async fn check_tuple(&self, store_id: &str, model_id: Option<&str>, tuple: &Tuple) -> Result<bool, TransportError> {
        self.with_resilience(|| self.raw.check_tuple(store_id, model_id, tuple, self.timeout)).await
    }

    pub async fn write_tuple(&self, store_id: &str, model_id: Option<&str>, tuple: &Tuple) -> Result<(), TransportError> {
        self.with_resilience(|| self.raw.write_tuple(store_id, model_id, tuple, self.timeout)).await
    }

    pub async fn delete_tuple(&self, store_id: &str, model_id: Option<&str>, tuple: &Tuple) -> Result<(), TransportError> {
        self.with_resilience(|| self.raw.delete_tuple(store_id, model_id, tuple, self.timeout)).await
    }

    pub async fn check_tuple_batch(
        &self,
        store_id: &str,
        model_id: Option<&str>,
        tuples: &[Tuple],
    ) -> Result<Vec<Result<bool, TransportError>>, TransportError> {
        self.with_resilience(|| self.raw.check_tuple_batch(store_id, model_id, tuples, self.timeout)).await
    }

    pub async fn get_store(&self, store_id: &str) -> Result<(bool, String), TransportError> {
        self.with_resilience(|| self.raw.get_store(store_id, self.timeout)).await
    }

    pub async fn create_store(&self, name: &str) -> Result<(String, String), TransportError> {
        self.with_resilience(|| self.raw.create_store(name, self.timeout)).await
    }

    pub async fn delete_store(&self, store_id: &str) -> Result<(), TransportError> {
        self.with_resilience(|| self.raw.delete_store(store_id, self.timeout)).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails its first `fail_count` check calls with `err`, then succeeds
    /// with `allowed`. Grounded on `span_collector`'s `FailingExporter`.
    pub struct FlakyTransport {
        fail_count: AtomicU32,
        err: TransportError,
        allowed: bool,
        pub calls: AtomicU32,
    }

    impl FlakyTransport {
        pub fn new(fail_count: u32, err: TransportError, allowed: bool) -> Self {
            Self {
                fail_count: AtomicU32::new(fail_count),
                err,
                allowed,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RawTransport for FlakyTransport {
        async fn check_tuple(&self, _: &str, _: Option<&str>, _: &Tuple, _: Duration) -> Result<bool, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_count.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(self.err.clone())
            } else {
                Ok(self.allowed)
            }
        }
        async fn write_tuple(&self, _: &str, _: Option<&str>, _: &Tuple, _: Duration) -> Result<(), TransportError> {
            Ok(())
        }
        async fn delete_tuple(&self, _: &str, _: Option<&str>, _: &Tuple, _: Duration) -> Result<(), TransportError> {
            Ok(())
        }
        async fn get_store(&self, _: &str, _: Duration) -> Result<(bool, String), TransportError> {
            Ok((true, "store".into()))
        }
        async fn create_store(&self, name: &str, _: Duration) -> Result<(String, String), TransportError> {
            Ok(("id-1".into(), name.into()))
        }
        async fn delete_store(&self, _: &str, _: Duration) -> Result<(), TransportError> {
            Ok(())
        }
        async fn ping(&self, _: Duration) -> Result<(), TransportError> {
            Ok(())
        }
    }
}
