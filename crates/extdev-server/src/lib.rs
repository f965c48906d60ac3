//! # extdev-server
//!
//! Axum HTTP + WebSocket server that streams extension build state to dev
//! clients.
//!
//! - [`DevServer`] wires the routes: the upgrade endpoint (default
//!   `/extensions`), build artifacts under `<ws_path>/<uuid>/assets/`,
//!   `/health`, `/metrics` and `/specifications`
//! - [`BroadcastServer`] subscribes to the payload store and fans every
//!   event out to connected clients; a new client gets one snapshot followed
//!   by strictly newer events
//! - Slow clients are dropped rather than allowed to stall the others
//! - The first build of each extension logs its preview link

#![deny(unsafe_code)]

pub mod assets;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod preview;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{
    BroadcastError, ConnectionSendError, MalformedUpgradeError, SerializationError,
    ServiceUnavailable,
};
pub use server::{AppState, DevServer, websocket_url};
pub use websocket::broadcast::BroadcastServer;
pub use websocket::connection::{ClientConnection, ConnectionState};
