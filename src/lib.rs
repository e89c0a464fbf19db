//! offcache - a journaled disk cache with read-through call interception
//!
//! Values are persisted one file per key, indexed by an append-only journal
//! that survives restarts and crashes ([`cache`]). A [`CacheLayer`] wraps async
//! operations so that results are served from the cache while fresh, stored
//! after successful calls, and, for operations declared with an offline
//! window, served stale when the real call fails ([`intercept`]).

pub mod cache;
pub mod cli;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod intercept;
pub mod key;
pub mod logging;
pub mod remote;

pub use cache::{CacheEntry, CacheManager, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecError, EntryCodec, PayloadType};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use intercept::{CacheLayer, CachePolicy, Fetched, Operation};
pub use key::{build_key, KeyArg, OperationId};
