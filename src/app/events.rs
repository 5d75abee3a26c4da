//! Outbound update events.
//!
//! The [`FotaController`](crate::fota::controller::FotaController) emits
//! these through the [`EventSink`](super::ports::EventSink) port. Adapters
//! on the other side decide what to do with them: log to serial, count
//! them for telemetry, record them in tests.

use crate::error::Error;
use crate::fota::controller::FotaState;
use crate::fota::manifest::ManifestError;
use crate::fota::receiver::ChunkError;

/// Structured events emitted by the update engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FotaEvent {
    /// A new manifest was installed.
    ManifestAccepted { total_chunks: u16, size: u32 },

    /// A manifest failed validation.
    ManifestRejected(ManifestError),

    /// An attempt in progress was abandoned for a new manifest.
    ManifestSuperseded { received: u16 },

    ChunkStored { index: u16, received: u16, total: u16 },

    ChunkDuplicate { index: u16 },

    ChunkRejected { index: u16, error: ChunkError },

    /// The controller moved between states.
    StateChanged { from: FotaState, to: FotaState },

    /// The candidate image was assembled (`len` bytes).
    Assembled { len: u64 },

    /// The image passed the hash check.
    Validated,

    /// The attempt failed and the controller is in `Failed`.
    Failed(Error),

    /// Chunk and image files were purged (boot or reset).
    Reset { purged: usize },
}
