//! # extdev-core
//!
//! Shared vocabulary for the extension development server.
//!
//! - **Branded IDs**: `ExtensionUuid`, `ConnectionId` as newtypes for type safety
//! - **Extension model**: `ExtensionPayload` (build state) and `ExtensionInstance`
//!   (build state tagged with uuid + version)
//! - **Events**: `StoreEvent` emitted by the payload store, `BroadcastMessage`
//!   as framed on the wire to dev clients

#![deny(unsafe_code)]

pub mod events;
pub mod extension;
pub mod ids;

pub use events::{BroadcastMessage, StoreEvent};
pub use extension::{ExtensionInstance, ExtensionPayload};
pub use ids::{ConnectionId, ExtensionUuid};
