//! Application boundary: port traits and the events crossing them.
//!
//! The update engine in [`crate::fota`] talks to storage, the nonce
//! ledger and event consumers only through the traits in [`ports`],
//! keeping it testable without a filesystem or flash.

pub mod events;
pub mod ports;
