//! Secure chunked firmware update.
//!
//! ```text
//!  envelope ─▶ auth::unwrap ─▶ message::parse ─▶ FotaController
//!                                                   │
//!                         ┌─────────────────────────┼──────────────────┐
//!                         ▼                         ▼                  ▼
//!                 manifest::validate     ChunkReceiver::accept   assembler ─▶ image
//!                                          │   │                     │          │
//!                                  bitmap ◀┘   └──▶ BlockStore ◀─────┴──────────┘
//! ```
//!
//! The controller owns the state machine; every other module is a stage
//! it sequences. Storage is reached only through the
//! [`BlockStore`](crate::app::ports::BlockStore) port.

pub mod assembler;
pub mod auth;
pub mod bitmap;
pub mod controller;
pub mod files;
pub mod image;
pub mod manifest;
pub mod message;
pub mod receiver;
