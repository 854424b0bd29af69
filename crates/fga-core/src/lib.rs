//! Consumer loop, host interop boundary and public facade for the embedded
//! fine-grained-authorization pipeline.
//!
//! This crate wires together [`fga_proto`]'s wire types, [`fga_cache`]'s two
//! cache tiers, [`fga_channel`]'s producer/consumer channel and
//! [`fga_transport`]'s RPC client into the single entry point a query
//! worker calls: [`Fga`].

mod consumer;
mod error;
mod facade;
mod host;
mod stats;

pub use consumer::ConsumerLoop;
pub use error::FgaError;
pub use facade::Fga;
pub use host::{HostEnv, LatchId, LatchWait, LogLevel, SharedLockHandle, StdHostEnv};
pub use stats::Stats;

pub use fga_cache::{GenerationRegistry, L1Cache, L2Cache, Scope};
pub use fga_channel::{ChannelError, Latch};
pub use fga_proto::{CacheKey, FgaConfig, RequestVariant, Response, ResponseBody, ResponseStatus, Tuple, TupleError};
pub use fga_transport::{Dispatcher, HttpRawTransport, RawTransport, TransportError};
