//! Per-download lifecycle state machine.
//!
//! One logical download moves through
//! `AwaitingMetadata -> Downloading -> (Seeding ->) Terminal`, driven by engine
//! notifications that arrive unordered. `advance` is the whole transition table;
//! anything it rejects leaves the phase untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a download currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DownloadPhase {
    /// A magnet's metadata is still being fetched under a placeholder GID.
    AwaitingMetadata,
    /// Content is transferring.
    #[default]
    Downloading,
    /// Download finished; the torrent keeps uploading.
    Seeding {
        /// When seeding began.
        started_at: DateTime<Utc>,
    },
    /// Completed, failed, or cancelled; no further engine interaction.
    Terminal,
}

/// Engine observations that move a download between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSignal {
    /// A metadata placeholder GID started.
    MetadataStarted,
    /// The metadata GID was superseded by a content GID.
    MetadataResolved,
    /// A content GID started transferring.
    ContentStarted,
    /// The download phase finished without seeding.
    Finished,
    /// The download finished and seeding began.
    SeedingStarted {
        /// When seeding began.
        at: DateTime<Utc>,
    },
    /// Seeding ended.
    SeedingFinished,
    /// The download failed or was rejected.
    Failed,
}

/// A signal that is not valid in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal download phase transition")]
pub struct IllegalTransition {
    /// Phase the download was in.
    pub from: DownloadPhase,
    /// Signal that was rejected.
    pub signal: PhaseSignal,
}

impl DownloadPhase {
    /// Apply `signal`, returning the next phase.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] when the signal does not apply to the
    /// current phase (for example, anything after `Terminal`).
    pub const fn advance(self, signal: PhaseSignal) -> Result<Self, IllegalTransition> {
        let next = match (self, signal) {
            (Self::AwaitingMetadata | Self::Downloading, PhaseSignal::MetadataStarted) => {
                Self::AwaitingMetadata
            }
            (
                Self::AwaitingMetadata | Self::Downloading,
                PhaseSignal::MetadataResolved | PhaseSignal::ContentStarted,
            ) => Self::Downloading,
            (Self::AwaitingMetadata | Self::Downloading, PhaseSignal::Finished)
            | (Self::Seeding { .. }, PhaseSignal::SeedingFinished)
            | (
                Self::AwaitingMetadata | Self::Downloading | Self::Seeding { .. },
                PhaseSignal::Failed,
            ) => Self::Terminal,
            (Self::Downloading, PhaseSignal::SeedingStarted { at }) => {
                Self::Seeding { started_at: at }
            }
            (from, signal) => return Err(IllegalTransition { from, signal }),
        };
        Ok(next)
    }

    /// Whether the download is seeding.
    #[must_use]
    pub const fn is_seeding(&self) -> bool {
        matches!(self, Self::Seeding { .. })
    }

    /// Whether the download reached its end.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnet_lifecycle_reaches_seeding() -> Result<(), IllegalTransition> {
        let now = Utc::now();
        let phase = DownloadPhase::default()
            .advance(PhaseSignal::MetadataStarted)?
            .advance(PhaseSignal::MetadataResolved)?
            .advance(PhaseSignal::ContentStarted)?
            .advance(PhaseSignal::SeedingStarted { at: now })?;
        assert_eq!(phase, DownloadPhase::Seeding { started_at: now });
        assert!(phase.advance(PhaseSignal::SeedingFinished)?.is_terminal());
        Ok(())
    }

    #[test]
    fn terminal_rejects_everything() {
        let err = DownloadPhase::Terminal
            .advance(PhaseSignal::Finished)
            .expect_err("terminal is final");
        assert_eq!(err.from, DownloadPhase::Terminal);
        assert!(
            DownloadPhase::Terminal
                .advance(PhaseSignal::Failed)
                .is_err()
        );
    }

    #[test]
    fn seeding_cannot_restart_or_complete_twice() {
        let seeding = DownloadPhase::Seeding {
            started_at: Utc::now(),
        };
        assert!(seeding.advance(PhaseSignal::Finished).is_err());
        assert!(
            seeding
                .advance(PhaseSignal::SeedingStarted { at: Utc::now() })
                .is_err()
        );
        assert!(seeding.advance(PhaseSignal::Failed).is_ok());
    }

    #[test]
    fn metadata_phase_cannot_seed_directly() {
        assert!(
            DownloadPhase::AwaitingMetadata
                .advance(PhaseSignal::SeedingStarted { at: Utc::now() })
                .is_err()
        );
    }
}
