//! Request dispatcher: converts slot-carried [`RequestVariant`]s into
//! [`TransportClient`] calls and builds the [`Response`] written back into
//! the slot.
//!
//! Configuration defaults (`store_id`, `authorization_model_id`) are filled
//! in when the payload omits them; the payload always wins when populated.

use crate::client::TransportClient;
use crate::error::TransportError;
use fga_proto::{FgaConfig, RequestVariant, Response, ResponseBody, ResponseStatus};

/// One dispatched request paired with the index it should be written back
/// to (a slot index, in the consumer's world — kept opaque here so this
/// crate doesn't need to depend on `fga-channel`).
pub struct Dispatched<T> {
    pub token: T,
    pub response: Response,
}

pub struct Dispatcher {
    transport: TransportClient,
    default_store_id: Option<String>,
    default_model_id: Option<String>,
}

impl Dispatcher {
    pub fn new(transport: TransportClient, config: &FgaConfig) -> Self {
        Self {
            transport,
            default_store_id: config.store_id.clone(),
            default_model_id: config.authorization_model_id.clone(),
        }
    }

    fn resolve_store_id<'a>(&'a self, payload_store_id: Option<&'a str>) -> Result<&'a str, Response> {
        payload_store_id
            .filter(|s| !s.is_empty())
            .or(self.default_store_id.as_deref())
            .ok_or_else(|| Response::error(ResponseStatus::ClientError, "no store_id on request and no default configured"))
    }

    fn resolve_model_id<'a>(&'a self, payload_model_id: Option<&'a str>) -> Option<&'a str> {
        payload_model_id.or(self.default_model_id.as_deref())
    }

    /// Dispatches a single request variant, mapping a [`TransportError`] onto
    /// the appropriate [`ResponseStatus`].
    pub async fn dispatch_one(&self, request: &RequestVariant) -> Response {
        match request {
            RequestVariant::CheckTuple { store_id, model_id, tuple } => {
                let store_id = match self.resolve_store_id(store_id.as_deref()) {
                    Ok(s) => s,
                    Err(resp) => return resp,
                };
                let model_id = self.resolve_model_id(model_id.as_deref());
                match self.transport.check_tuple(store_id, model_id, tuple).await {
                    Ok(allowed) => Response::ok(ResponseBody::CheckTuple { allowed }),
                    Err(e) => transport_error_response(e),
                }
            }
            RequestVariant::WriteTuple { store_id, model_id, tuple } => {
                let store_id = match self.resolve_store_id(store_id.as_deref()) {
                    Ok(s) => s,
                    Err(resp) => return resp,
                };
                let model_id = self.resolve_model_id(model_id.as_deref());
                match self.transport.write_tuple(store_id, model_id, tuple).await {
                    Ok(()) => Response::ok(ResponseBody::WriteTuple),
                    Err(e) => transport_error_response(e),
                }
            }
            RequestVariant::DeleteTuple { store_id, model_id, tuple } => {
                let store_id = match self.resolve_store_id(store_id.as_deref()) {
                    Ok(s) => s,
                    Err(resp) => return resp,
                };
                let model_id = self.resolve_model_id(model_id.as_deref());
                match self.transport.delete_tuple(store_id, model_id, tuple).await {
                    Ok(()) => Response::ok(ResponseBody::DeleteTuple),
                    Err(e) => transport_error_response(e),
                }
            }
            RequestVariant::GetStore { store_id } => {
                let store_id = match self.resolve_store_id(store_id.as_deref()) {
                    Ok(s) => s,
                    Err(resp) => return resp,
                };
                match self.transport.get_store(store_id).await {
                    Ok((found, name)) => Response::ok(ResponseBody::GetStore { found, name }),
                    Err(e) => transport_error_response(e),
                }
            }
            RequestVariant::CreateStore { name } => {
                if name.is_empty() {
                    return Response::error(ResponseStatus::ClientError, "create_store requires a non-empty name");
                }
                match self.transport.create_store(name).await {
                    Ok((id, name)) => Response::ok(ResponseBody::CreateStore { id, name }),
                    Err(e) => transport_error_response(e),
                }
            }
            RequestVariant::DeleteStore { store_id } => {
                if store_id.is_empty() {
                    return Response::error(ResponseStatus::ClientError, "delete_store requires a non-empty store_id");
                }
                match self.transport.delete_store(store_id).await {
                    Ok(()) => Response::ok(ResponseBody::DeleteStore),
                    Err(e) => transport_error_response(e),
                }
            }
        }
    }

    /// Dispatches a batch of `(token, request)` pairs. Consecutive runs of
    /// homogeneous `CheckTuple` requests sharing the same `(store_id,
    /// model_id)` are coalesced into one [`TransportClient::check_tuple_batch`]
    /// call; every other variant, and any `CheckTuple` that doesn't share a
    /// run's store/model, is dispatched individually via [`Self::dispatch_one`].
    pub async fn dispatch_batch<T: Clone>(&self, items: Vec<(T, RequestVariant)>) -> Vec<Dispatched<T>> {
        let mut out = Vec::with_capacity(items.len());
        let mut i = 0;
        while i < items.len() {
            let (_, request) = &items[i];
            let run_key = check_tuple_key(request, &self.default_store_id, &self.default_model_id);
            match run_key {
                None => {
                    let response = self.dispatch_one(request).await;
                    out.push(Dispatched {
                        token: items[i].0.clone(),
                        response,
                    });
                    i += 1;
                }
                Some((store_id, model_id)) => {
                    let mut run_end = i + 1;
                    while run_end < items.len()
                        && check_tuple_key(&items[run_end].1, &self.default_store_id, &self.default_model_id)
                            == Some((store_id.clone(), model_id.clone()))
                    {
                        run_end += 1;
                    }
                    if run_end - i == 1 {
                        let response = self.dispatch_one(request).await;
                        out.push(Dispatched {
                            token: items[i].0.clone(),
                            response,
                        });
                    } else {
                        let tuples: Vec<_> = items[i..run_end]
                            .iter()
                            .map(|(_, r)| match r {
                                RequestVariant::CheckTuple { tuple, .. } => tuple.clone(),
                                _ => unreachable!("run membership guarantees CheckTuple"),
                            })
                            .collect();
                        let batch_result = self.transport.check_tuple_batch(&store_id, model_id.as_deref(), &tuples).await;
                        match batch_result {
                            Ok(results) => {
                                for (item, result) in items[i..run_end].iter().zip(results) {
                                    let response = match result {
                                        Ok(allowed) => Response::ok(ResponseBody::CheckTuple { allowed }),
                                        Err(e) => transport_error_response(e),
                                    };
                                    out.push(Dispatched {
                                        token: item.0.clone(),
                                        response,
                                    });
                                }
                            }
                            Err(e) => {
                                let response = transport_error_response(e);
                                for item in &items[i..run_end] {
                                    out.push(Dispatched {
                                        token: item.0.clone(),
                                        response: response.clone(),
                                    });
                                }
                            }
                        }
                    }
                    i = run_end;
                }
            }
        }
        out
    }

    pub fn is_healthy(&self) -> bool {
        self.transport.is_healthy()
    }
}

/// `Some((store_id, model_id))` iff `request` is a `CheckTuple` with its
/// store/model resolved, used to detect a coalescable run in
/// [`Dispatcher::dispatch_batch`]. Doesn't validate `store_id` non-empty —
/// an unresolved store still groups together and later fails uniformly in
/// [`Dispatcher::dispatch_one`]'s resolution.
fn check_tuple_key(
    request: &RequestVariant,
    default_store_id: &Option<String>,
    default_model_id: &Option<String>,
) -> Option<(String, Option<String>)> {
    match request {
        RequestVariant::CheckTuple { store_id, model_id, .. } => {
            let store_id = store_id.clone().or_else(|| default_store_id.clone()).unwrap_or_default();
            let model_id = model_id.clone().or_else(|| default_model_id.clone());
            Some((store_id, model_id))
        }
        _ => None,
    }
}

fn transport_error_response(e: TransportError) -> Response {
    let status = match e {
        TransportError::InvalidArgument(_) => ResponseStatus::ClientError,
        // Non-retryable responses the remote actually returned (as opposed to
        // a failure to reach it at all) are a server-side outcome, not a
        // transport-layer one, per spec.md §7's "the remote returned a
        // non-OK status that is not retryable".
        TransportError::PermissionDenied(_) | TransportError::NotFound(_) => ResponseStatus::ServerError,
        _ => ResponseStatus::TransportError,
    };
    Response::error(status, e.to_string())
}
