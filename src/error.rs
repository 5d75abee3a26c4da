//! Unified error type for the update engine.
//!
//! Each stage keeps its own small `Copy` error enum; this `Error` wraps
//! them so the controller and its callers handle one type. All variants
//! are `Copy` and can be carried in events without allocation.

use core::fmt;

use crate::app::ports::{ConfigError, LedgerError};
use crate::fota::assembler::AssemblyError;
use crate::fota::auth::AuthError;
use crate::fota::controller::FotaState;
use crate::fota::image::ImageError;
use crate::fota::manifest::ManifestError;
use crate::fota::receiver::ChunkError;

/// Every fallible engine operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Envelope failed authentication or decoding. Fatal to the message only.
    Auth(AuthError),
    /// Manifest rejected; any attempt in progress is untouched.
    Manifest(ManifestError),
    /// Chunk rejected; re-sending it may succeed.
    Chunk(ChunkError),
    /// Assembly failed; the attempt is over.
    Assembly(AssemblyError),
    /// Image integrity check failed; the attempt is over.
    Image(ImageError),
    /// No nonce could be persisted for an outbound envelope.
    Ledger(LedgerError),
    Config(ConfigError),
    /// The controller is in a terminal state and needs `reset()` first.
    AwaitingReset(FotaState),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// The error ends the current update attempt.
    pub fn is_fatal_to_attempt(&self) -> bool {
        matches!(self, Self::Assembly(_) | Self::Image(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "auth: {e}"),
            Self::Manifest(e) => write!(f, "manifest: {e}"),
            Self::Chunk(e) => write!(f, "chunk: {e}"),
            Self::Assembly(e) => write!(f, "assembly: {e}"),
            Self::Image(e) => write!(f, "image: {e}"),
            Self::Ledger(e) => write!(f, "ledger: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::AwaitingReset(state) => write!(f, "update {state}, reset required"),
        }
    }
}

impl std::error::Error for Error {}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<ManifestError> for Error {
    fn from(e: ManifestError) -> Self {
        Self::Manifest(e)
    }
}

impl From<ChunkError> for Error {
    fn from(e: ChunkError) -> Self {
        Self::Chunk(e)
    }
}

impl From<AssemblyError> for Error {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

impl From<ImageError> for Error {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<LedgerError> for Error {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
