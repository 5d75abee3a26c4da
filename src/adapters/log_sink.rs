//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing update events through the `log`
//! facade (serial console on the device, `env_logger` in the simulator).
//! A telemetry uplink adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::FotaEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`FotaEvent`] as a single `FOTA | ...` line.
#[derive(Default)]
pub struct LogEventSink {
    emitted: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FotaEvent) {
        self.emitted += 1;
        match event {
            FotaEvent::ManifestAccepted { total_chunks, size } => {
                info!("FOTA | manifest accepted | {} chunks, {} bytes", total_chunks, size);
            }
            FotaEvent::ManifestRejected(e) => {
                warn!("FOTA | manifest rejected | {}", e);
            }
            FotaEvent::ManifestSuperseded { received } => {
                info!("FOTA | attempt superseded | {} chunks discarded", received);
            }
            FotaEvent::ChunkStored {
                index,
                received,
                total,
            } => {
                info!("FOTA | chunk #{} stored | {}/{}", index, received, total);
            }
            FotaEvent::ChunkDuplicate { index } => {
                info!("FOTA | chunk #{} duplicate", index);
            }
            FotaEvent::ChunkRejected { index, error } => {
                if error.is_authentication_failure() {
                    warn!("FOTA | chunk #{} AUTH FAILURE | {}", index, error);
                } else {
                    warn!("FOTA | chunk #{} rejected | {}", index, error);
                }
            }
            FotaEvent::StateChanged { from, to } => {
                info!("FOTA | state | {} -> {}", from, to);
            }
            FotaEvent::Assembled { len } => {
                info!("FOTA | image assembled | {} bytes", len);
            }
            FotaEvent::Validated => {
                info!("FOTA | image verified, ready to install");
            }
            FotaEvent::Failed(e) => {
                warn!("FOTA | update failed | {}", e);
            }
            FotaEvent::Reset { purged } => {
                info!("FOTA | reset | {} file(s) purged", purged);
            }
        }
    }
}
