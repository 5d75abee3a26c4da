//! Update diagnostics.
//!
//! [`UpdateSnapshot`] is a point-in-time copy of the controller's progress,
//! cheap to take and detached from the controller, for console dumps and
//! the simulator's final report. `Display` renders one field per line.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::fota::controller::FotaState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    pub state: FotaState,
    pub running_version: String,
    /// Version named by the active manifest, if any.
    pub target_version: Option<String>,
    pub received: u16,
    pub total: u16,
    /// Percentage of chunks received.
    pub progress: f32,
    pub last_chunk: Option<u16>,
    pub last_chunk_verified: bool,
    pub next_missing: Option<u16>,
}

impl fmt::Display for UpdateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== FOTA status ===")?;
        writeln!(f, "State:    {}", self.state)?;
        writeln!(f, "Running:  v{}", self.running_version)?;
        match &self.target_version {
            Some(v) => writeln!(f, "Target:   v{v}")?,
            None => writeln!(f, "Target:   -")?,
        }
        writeln!(
            f,
            "Chunks:   {}/{} ({:.1}%)",
            self.received, self.total, self.progress
        )?;
        match self.last_chunk {
            Some(n) => writeln!(
                f,
                "Last:     #{n} ({})",
                if self.last_chunk_verified { "verified" } else { "rejected" }
            )?,
            None => writeln!(f, "Last:     -")?,
        }
        match self.next_missing {
            Some(n) => write!(f, "Missing:  next #{n}"),
            None => write!(f, "Missing:  none"),
        }
    }
}
