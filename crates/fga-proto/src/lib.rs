//! Wire types for the embedded fine-grained-authorization pipeline: cache
//! keys, authorization tuples, request/response variants, and the
//! process-wide configuration they're all parameterized by.
//!
//! This crate has no I/O and no concurrency primitives of its own — it is
//! the vocabulary `fga-cache`, `fga-channel` and `fga-transport` share.

mod config;
mod key;
mod request;
mod response;
mod tuple;

pub use config::{ConfigError, FgaConfig};
pub use key::CacheKey;
pub use request::{RequestId, RequestVariant};
pub use response::{Response, ResponseBody, ResponseStatus, ERROR_MESSAGE_MAX_LEN};
pub use tuple::{Tuple, TupleError, ID_MAX_LEN, RELATION_MAX_LEN, STORE_ID_MAX_LEN, TYPE_MAX_LEN};
