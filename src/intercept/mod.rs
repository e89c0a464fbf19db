//! Transparent caching of async operations
//!
//! Operations are declared with an [`Operation`] carrying an optional
//! [`CachePolicy`]; a [`CacheLayer`] applies the policy around the real call.
//! Services usually hide this behind a decorator that implements the same
//! trait as the plain service, see [`crate::remote`].

mod layer;
mod policy;

pub use layer::{CacheLayer, Fetched};
pub use policy::{CachePolicy, Operation};
