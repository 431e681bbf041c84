//! # adbr-bridge
//!
//! A TCP server that re-implements the ADB *device-side* protocol so that a
//! remote ADB client can talk to a local device over the network. Each
//! accepted connection runs the CNXN → AUTH → multiplex state machine; each
//! logical stream is backed by a real ADB service opened through
//! [`adbr_client::Client`].

pub mod counter;
pub mod error;
pub mod server;
mod service;
pub mod service_map;
mod socket;

pub use counter::RollingCounter;
pub use error::BridgeError;
pub use server::{BridgeServer, BridgeServerConfig, TrustHook};
