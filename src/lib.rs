//! Relay firmware core: the secure chunked firmware-update engine.
//!
//! Exposes the engine, its ports and the host adapters for the simulator
//! and integration tests. Transport, installation and reboot live outside
//! this crate.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fota;

pub use error::{Error, Result};
pub use fota::controller::{FotaController, FotaOutcome, FotaState};
