//! Integration test common infrastructure.
//!
//! Spawns icbd instances and drives them with a packet-level test client.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
