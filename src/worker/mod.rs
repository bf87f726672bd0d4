//! Offline cache interceptor.
//!
//! - Install: pre-populate the current versioned store from the asset manifest
//! - Activate: delete the stores of every other version
//! - Fetch: images cache-first, everything else network-first with an
//!   offline fallback to the store and then to the app shell

mod interceptor;
mod lifecycle;
mod strategy;

pub use interceptor::{FetchOutcome, Interceptor, WorkerConfig};
pub use lifecycle::WorkerState;
