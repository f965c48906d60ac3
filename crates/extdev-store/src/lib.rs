//! # extdev-store
//!
//! Single source of truth for "current extension state".
//!
//! - [`StoreState`]: the pure versioning/diffing logic (no I/O, no tasks)
//! - [`PayloadStore`]: cloneable handle to a single writer task that owns all
//!   mutations, so version assignment and event order match call order
//! - Subscribers receive [`StoreEvent`](extdev_core::StoreEvent)s over
//!   unbounded channels, dispatched while the state lock is held

#![deny(unsafe_code)]

pub mod errors;
pub mod state;
pub mod store;

pub use errors::{Result, StoreError};
pub use state::{PayloadStoreEntry, StoreSnapshot, StoreState, UpsertOutcome};
pub use store::{PayloadStore, StoreSubscription};
