//! # adbr-client
//!
//! Host-side client for the ADB smart-socket protocol.
//!
//! The [`Client`] talks to a local `adb` server at `127.0.0.1:5037`
//! (starting it on demand) and exposes one method per ADB service:
//! device listing and tracking, shell execution, file transfer over the
//! SYNC sub-protocol, port forwarding, package management, logcat and
//! framebuffer access. Public-key parsing and fingerprinting for the ADB
//! authentication scheme live in [`auth`].

pub mod auth;
pub mod client;
pub mod commands;
pub mod connection;
pub mod dump;
pub mod error;
pub mod framebuffer;
pub mod line_transform;
pub mod parser;
pub mod proc_stat;
pub mod sync;
pub mod tracker;

pub use auth::PublicKey;
pub use client::{Client, DeviceClient};
pub use commands::am::{Extra, ExtraValue, IntentOptions};
pub use commands::host_serial::Forward;
pub use commands::pm::{Feature, UninstallOptions};
pub use commands::reverse::Reverse;
pub use commands::streams::{LogcatOptions, TransformedStream};
pub use commands::system::RebootMode;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
pub use framebuffer::FramebufferMeta;
pub use parser::Parser;
pub use sync::{Entry, Stats, Sync, Transfer, TransferEvent};
pub use tracker::{ChangeSet, Device, DeviceState, DeviceTracker, TrackerEvent};
