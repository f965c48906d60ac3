//! WebSocket connection handling, broadcast fan-out and upgrade admission.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;
pub mod session;
pub mod upgrade;
