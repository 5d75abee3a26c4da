//! FOTA controller: the update state machine.
//!
//! [`FotaController`] owns the active manifest, the reception bitmap and
//! the chunk store. It is driven entirely from outside: the caller feeds
//! it authenticated envelopes (or already-parsed messages) and, in manual
//! mode, asks it to assemble and validate. It never polls or blocks on
//! the network.
//!
//! ```text
//!          manifest            first chunk           last chunk
//!  Idle ───────────▶ Manifest ───────────▶ Receiving ──────────▶ ReadyToAssemble
//!   ▲                Received                                        │ assemble()
//!   │ reset()                                                        ▼
//!   ├─────────────── Validated ◀────────────────────────────────── Assembled
//!   │                                          validate_image()
//!   └─────────────── Failed  ◀── any assembly / validation failure
//! ```
//!
//! `Validated` and `Failed` are terminal: further messages are refused
//! with [`Error::AwaitingReset`] until [`FotaController::reset`] is called.
//! Entering either one destroys the manifest and the reception bitmap;
//! only the target version (and, after `Validated`, the image) remain.
//!
//! The controller has no internal synchronization. On a multi-threaded
//! host, wrap it in a `Mutex` (or give it a single owning task).

use core::fmt;
use core::time::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::assembler::{self, AssemblyError, ImageHandle};
use super::auth::{self, SecureEnvelope};
use super::bitmap::ReceptionBitmap;
use super::files;
use super::image::{self, ImageError};
use super::manifest::{self, Manifest, ManifestCandidate};
use super::message::{self, ChunkMessage, FotaStatus, InboundMessage};
use super::receiver::{ChunkOutcome, ChunkReceiver};
use crate::app::events::FotaEvent;
use crate::app::ports::{BlockStore, EventSink, NonceLedger};
use crate::config::{EngineConfig, VERSION_CAPACITY};
use crate::diagnostics::UpdateSnapshot;
use crate::error::{Error, Result};

// ───────────────────────────────────────────────────────────────
// State & outcome
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FotaState {
    Idle,
    ManifestReceived,
    Receiving,
    ReadyToAssemble,
    Assembled,
    Validated,
    Failed,
}

impl FotaState {
    /// `Validated` or `Failed`; only `reset()` leaves these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Validated | Self::Failed)
    }

    /// A manifest is installed and the attempt has not finished yet.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::ManifestReceived | Self::Receiving | Self::ReadyToAssemble | Self::Assembled
        )
    }
}

impl fmt::Display for FotaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ManifestReceived => "manifest-received",
            Self::Receiving => "receiving",
            Self::ReadyToAssemble => "ready-to-assemble",
            Self::Assembled => "assembled",
            Self::Validated => "validated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a handled message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FotaOutcome {
    /// The message carried nothing to act on (no FOTA content, or a
    /// manifest for the firmware already running).
    NoUpdate,
    /// A new manifest was installed; reception starts from scratch.
    ManifestAccepted,
    /// The active manifest was re-sent; progress is kept.
    ManifestUnchanged,
    /// A chunk was applied.
    Chunk(ChunkOutcome),
    /// The last chunk completed the image and it passed validation.
    Completed,
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct FotaController<S: BlockStore> {
    config: EngineConfig,
    store: S,
    state: FotaState,
    manifest: Option<Manifest>,
    /// Version of the current or most recently finished attempt; outlives
    /// the manifest so terminal snapshots still name their target.
    target_version: Option<heapless::String<VERSION_CAPACITY>>,
    bitmap: ReceptionBitmap,
    /// Index of the most recently accepted chunk. A rejection leaves it
    /// alone and only clears `last_chunk_verified`.
    last_chunk: Option<u16>,
    last_chunk_verified: bool,
    just_started: bool,
    image: Option<ImageHandle>,
}

impl<S: BlockStore> FotaController<S> {
    /// Create an idle controller. Call [`begin`](Self::begin) at boot.
    pub fn new(config: EngineConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            state: FotaState::Idle,
            manifest: None,
            target_version: None,
            bitmap: ReceptionBitmap::new(),
            last_chunk: None,
            last_chunk_verified: false,
            just_started: false,
            image: None,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot-time cleanup: drop every chunk file and any stale image left
    /// by a previous run, then start idle. Returns the number of files
    /// removed.
    pub fn begin(&mut self, sink: &mut impl EventSink) -> usize {
        let purged = files::purge(&mut self.store);
        self.clear();
        self.transition(FotaState::Idle, sink);
        info!("fota: ready (running v{})", self.config.current_version);
        sink.emit(&FotaEvent::Reset { purged });
        purged
    }

    /// Abandon the current attempt and return to `Idle`.
    ///
    /// Chunk files are purged. The image is purged too unless it was
    /// validated, in which case it stays for the installer.
    pub fn reset(&mut self, sink: &mut impl EventSink) -> usize {
        let purged = if self.state == FotaState::Validated {
            files::purge_chunks(&mut self.store)
        } else {
            files::purge(&mut self.store)
        };
        self.clear();
        self.transition(FotaState::Idle, sink);
        sink.emit(&FotaEvent::Reset { purged });
        purged
    }

    fn clear(&mut self) {
        self.retire_manifest();
        self.target_version = None;
        self.image = None;
    }

    /// Destroy the manifest and reception state of a finished attempt.
    fn retire_manifest(&mut self) {
        self.manifest = None;
        self.bitmap.clear();
        self.last_chunk = None;
        self.last_chunk_verified = false;
        self.just_started = false;
    }

    // ── Inbound messages ──────────────────────────────────────

    /// Authenticate, decode and dispatch one inbound envelope.
    ///
    /// An envelope that fails authentication never reaches the state
    /// machine.
    pub fn handle_envelope(
        &mut self,
        envelope: &SecureEnvelope,
        sink: &mut impl EventSink,
    ) -> Result<FotaOutcome> {
        let payload = auth::unwrap(self.config.psk_bytes(), envelope)?;
        match message::parse(&payload)? {
            Some(msg) => self.handle(msg, sink),
            None => {
                debug!("fota: envelope {} carries no FOTA message", envelope.sequence_number);
                Ok(FotaOutcome::NoUpdate)
            }
        }
    }

    /// Dispatch an already authenticated message.
    pub fn handle(&mut self, msg: InboundMessage, sink: &mut impl EventSink) -> Result<FotaOutcome> {
        match msg {
            InboundMessage::Manifest(candidate) => self.apply_manifest(&candidate, sink),
            InboundMessage::Chunk(chunk) => self.accept_chunk(&chunk, sink),
        }
    }

    /// Validate and install a manifest.
    ///
    /// A different valid manifest supersedes any attempt in progress and
    /// purges its chunks. An invalid one leaves the current attempt alone.
    pub fn apply_manifest(
        &mut self,
        candidate: &ManifestCandidate,
        sink: &mut impl EventSink,
    ) -> Result<FotaOutcome> {
        if self.state.is_terminal() {
            return Err(Error::AwaitingReset(self.state));
        }

        let manifest =
            match manifest::validate(candidate, &self.config.limits, &self.config.current_version) {
                Ok(m) => m,
                Err(e) if e.is_noop() => return Ok(FotaOutcome::NoUpdate),
                Err(e) => {
                    sink.emit(&FotaEvent::ManifestRejected(e));
                    return Err(e.into());
                }
            };

        if let Some(active) = &self.manifest {
            if *active == manifest {
                debug!("fota: manifest v{} re-sent, keeping progress", manifest.version());
                return Ok(FotaOutcome::ManifestUnchanged);
            }
            warn!(
                "fota: v{} superseded by v{} at {}/{} chunks",
                active.version(),
                manifest.version(),
                self.bitmap.count(),
                active.total_chunks()
            );
            sink.emit(&FotaEvent::ManifestSuperseded {
                received: self.bitmap.count(),
            });
        }

        let purged = files::purge(&mut self.store);
        if purged > 0 {
            debug!("fota: removed {purged} file(s) from a previous attempt");
        }

        self.clear();
        sink.emit(&FotaEvent::ManifestAccepted {
            total_chunks: manifest.total_chunks(),
            size: manifest.size(),
        });
        self.target_version = heapless::String::try_from(manifest.version()).ok();
        self.manifest = Some(manifest);
        self.just_started = true;
        self.transition(FotaState::ManifestReceived, sink);
        Ok(FotaOutcome::ManifestAccepted)
    }

    /// Apply one chunk to the active update.
    ///
    /// Rejected chunks leave the bitmap untouched and may be re-sent. When
    /// the last chunk lands and `auto_assemble` is set, the image is
    /// assembled and validated before this returns.
    pub fn accept_chunk(
        &mut self,
        chunk: &ChunkMessage,
        sink: &mut impl EventSink,
    ) -> Result<FotaOutcome> {
        if self.state.is_terminal() {
            return Err(Error::AwaitingReset(self.state));
        }

        let result = ChunkReceiver::new(&mut self.store, &mut self.bitmap, self.config.psk_bytes())
            .accept(chunk, self.manifest.as_ref());

        if self.manifest.is_some() {
            if result.is_ok() {
                self.last_chunk = Some(chunk.index);
            }
            self.last_chunk_verified = result.is_ok();
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                sink.emit(&FotaEvent::ChunkRejected {
                    index: chunk.index,
                    error,
                });
                return Err(error.into());
            }
        };

        let total = self.total_chunks();
        match outcome {
            ChunkOutcome::DuplicateIgnored => {
                sink.emit(&FotaEvent::ChunkDuplicate { index: chunk.index });
                return Ok(FotaOutcome::Chunk(outcome));
            }
            ChunkOutcome::Stored => sink.emit(&FotaEvent::ChunkStored {
                index: chunk.index,
                received: self.bitmap.count(),
                total,
            }),
        }

        if self.state == FotaState::ManifestReceived {
            self.transition(FotaState::Receiving, sink);
        }
        if !self.bitmap.is_full(total) {
            return Ok(FotaOutcome::Chunk(outcome));
        }

        info!("fota: all {total} chunks received");
        self.transition(FotaState::ReadyToAssemble, sink);
        if !self.config.auto_assemble {
            return Ok(FotaOutcome::Chunk(outcome));
        }
        self.assemble(sink)?;
        self.validate_image(sink)?;
        Ok(FotaOutcome::Completed)
    }

    // ── Assembly & validation ─────────────────────────────────

    /// Concatenate the stored chunks into the candidate image.
    ///
    /// Refused without a state change while chunks are missing; any I/O or
    /// size failure moves the controller to `Failed`.
    pub fn assemble(&mut self, sink: &mut impl EventSink) -> Result<ImageHandle> {
        if self.state.is_terminal() {
            return Err(Error::AwaitingReset(self.state));
        }
        let Some(manifest) = self.manifest.as_ref() else {
            return Err(AssemblyError::Incomplete.into());
        };
        if !self.bitmap.is_full(manifest.total_chunks()) {
            return Err(AssemblyError::Incomplete.into());
        }

        match assembler::assemble(&mut self.store, manifest, &self.bitmap) {
            Ok(handle) => {
                self.image = Some(handle);
                sink.emit(&FotaEvent::Assembled { len: handle.len });
                self.transition(FotaState::Assembled, sink);
                Ok(handle)
            }
            Err(e) => Err(self.fail(e.into(), sink)),
        }
    }

    /// Hash the assembled image and compare it to the manifest.
    ///
    /// On success the chunk files and the manifest are dropped and the
    /// image is left for the installer.
    pub fn validate_image(&mut self, sink: &mut impl EventSink) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::AwaitingReset(self.state));
        }
        let (Some(handle), Some(manifest)) = (self.image, self.manifest.as_ref()) else {
            return Err(ImageError::Missing.into());
        };

        match image::validate_image(&mut self.store, &handle, manifest) {
            Ok(()) => {
                info!("fota: v{} verified and ready to install", manifest.version());
                files::purge_chunks(&mut self.store);
                self.retire_manifest();
                sink.emit(&FotaEvent::Validated);
                self.transition(FotaState::Validated, sink);
                Ok(())
            }
            Err(e) => {
                self.image = None;
                Err(self.fail(e.into(), sink))
            }
        }
    }

    fn fail(&mut self, error: Error, sink: &mut impl EventSink) -> Error {
        warn!("fota: update failed: {error}");
        files::purge(&mut self.store);
        self.retire_manifest();
        self.image = None;
        sink.emit(&FotaEvent::Failed(error));
        self.transition(FotaState::Failed, sink);
        error
    }

    fn transition(&mut self, to: FotaState, sink: &mut impl EventSink) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("fota: {from} -> {to}");
        sink.emit(&FotaEvent::StateChanged { from, to });
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> FotaState {
        self.state
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of distinct chunks stored for the active manifest.
    pub fn received(&self) -> u16 {
        self.bitmap.count()
    }

    pub fn total_chunks(&self) -> u16 {
        self.manifest.as_ref().map_or(0, Manifest::total_chunks)
    }

    /// Percentage of chunks received, `0.0` without a manifest.
    pub fn progress(&self) -> f32 {
        match self.total_chunks() {
            0 => 0.0,
            total => f32::from(self.bitmap.count()) / f32::from(total) * 100.0,
        }
    }

    /// Every chunk of a valid manifest has been received.
    pub fn is_complete(&self) -> bool {
        self.manifest.is_some() && self.bitmap.is_full(self.total_chunks())
    }

    pub fn next_missing_chunk(&self) -> Option<u16> {
        self.bitmap.first_missing(self.total_chunks())
    }

    pub fn missing_chunks(&self) -> Vec<u16> {
        self.bitmap.missing(self.total_chunks()).collect()
    }

    /// Status to embed in the next outbound request, once an update is in
    /// progress and a chunk has been accepted. `chunk_received` names the
    /// last accepted chunk; `verified` is false if a later one was rejected.
    pub fn status_report(&self) -> Option<FotaStatus> {
        if !self.state.is_in_progress() {
            return None;
        }
        self.last_chunk.map(|chunk_received| FotaStatus {
            chunk_received,
            verified: self.last_chunk_verified,
        })
    }

    /// Build and seal the next outbound status request: the running
    /// firmware version plus `"fota_status"` while an update is in
    /// progress. The nonce is persisted before the envelope exists.
    pub fn seal_status<L: NonceLedger + ?Sized>(&self, ledger: &mut L) -> Result<SecureEnvelope> {
        let mut request = serde_json::Map::new();
        request.insert(
            "firmware_version".into(),
            self.config.current_version.as_str().into(),
        );
        if let Some(status) = self.status_report() {
            status.insert_into(&mut request);
        }
        let body = serde_json::Value::Object(request).to_string();
        Ok(auth::seal(self.config.psk_bytes(), ledger, body.as_bytes())?)
    }

    /// Chunks are still outstanding; the caller should poll quickly.
    pub fn needs_fast_polling(&self) -> bool {
        self.state.is_in_progress() && !self.is_complete()
    }

    pub fn recommended_poll_interval(&self) -> Duration {
        let ms = if self.needs_fast_polling() {
            self.config.fast_poll_interval_ms
        } else {
            self.config.poll_interval_ms
        };
        Duration::from_millis(u64::from(ms))
    }

    /// A manifest was accepted since the last [`clear_just_started`](Self::clear_just_started).
    pub fn just_started(&self) -> bool {
        self.just_started
    }

    pub fn clear_just_started(&mut self) {
        self.just_started = false;
    }

    /// The assembled image, once assembly has succeeded.
    pub fn image(&self) -> Option<ImageHandle> {
        self.image
    }

    pub fn snapshot(&self) -> UpdateSnapshot {
        UpdateSnapshot {
            state: self.state,
            running_version: self.config.current_version.to_string(),
            target_version: self.target_version.as_ref().map(|v| v.to_string()),
            received: self.bitmap.count(),
            total: self.total_chunks(),
            progress: self.progress(),
            last_chunk: self.last_chunk,
            last_chunk_verified: self.last_chunk_verified,
            next_missing: self.next_missing_chunk(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

// ── Tests ─────────────────────────────────────────────────────
