//! Core types for the duplex two-region failover control plane.
//!
//! This crate holds what every other duplex crate needs to agree on:
//!
//! - **Regions**: the two-member active-active topology (`RegionPair`)
//! - **HLC timestamps**: the ordering basis for last-writer-wins replication
//! - **Configuration**: the root TOML config loaded by the binary
//!
//! Everything here is plain data; the runtime machinery lives in the
//! subsystem crates (`duplex-replication`, `duplex-health`, `duplex-dns`,
//! `duplex-edge`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hlc;
pub mod region;

pub use config::{Config, LogFormat};
pub use error::{Error, Result};
pub use hlc::{HlcClock, HlcTimestamp};
pub use region::{Region, RegionId, RegionPair, RegionRole, StorageClass};
