//! Network layer: listener and per-connection handling.

pub mod connection;
pub mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
