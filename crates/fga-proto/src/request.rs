//! Request variant: a tagged union over the six operations the core exposes.

use crate::tuple::Tuple;

/// Monotonic, per-process request identifier used to correlate a slot's
/// request with its eventual response and to distinguish stale completions
/// after a producer cancels and releases its slot.
pub type RequestId = u64;

/// Tagged union over the request shapes the channel carries.
///
/// Each variant carries `store_id`/`model_id` only when the caller supplied
/// them explicitly; the dispatcher fills in process-wide defaults from
/// [`crate::config::FgaConfig`] otherwise — the payload always wins when
/// populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestVariant {
    CheckTuple {
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    },
    WriteTuple {
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    },
    DeleteTuple {
        store_id: Option<String>,
        model_id: Option<String>,
        tuple: Tuple,
    },
    GetStore {
        store_id: Option<String>,
    },
    CreateStore {
        name: String,
    },
    DeleteStore {
        store_id: String,
    },
}

impl RequestVariant {
    /// Short, stable tag used for batching decisions and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckTuple { .. } => "check_tuple",
            Self::WriteTuple { .. } => "write_tuple",
            Self::DeleteTuple { .. } => "delete_tuple",
            Self::GetStore { .. } => "get_store",
            Self::CreateStore { .. } => "create_store",
            Self::DeleteStore { .. } => "delete_store",
        }
    }

    /// `store_id` carried on the payload, if the caller supplied one.
    pub fn store_id(&self) -> Option<&str> {
        match self {
            Self::CheckTuple { store_id, .. }
            | Self::WriteTuple { store_id, .. }
            | Self::DeleteTuple { store_id, .. }
            | Self::GetStore { store_id } => store_id.as_deref(),
            Self::CreateStore { .. } => None,
            Self::DeleteStore { store_id } => Some(store_id.as_str()),
        }
    }

    /// Resolves `store_id`, falling back to `default_store_id`. `None` only
    /// when neither the payload nor the default configuration supplies one —
    /// the dispatcher rejects that case as a [`crate::response::ResponseStatus::ClientError`].
    pub fn resolved_store_id<'a>(&'a self, default_store_id: &'a str) -> Option<&'a str> {
        self.store_id().or(Some(default_store_id)).filter(|s| !s.is_empty())
    }
}
