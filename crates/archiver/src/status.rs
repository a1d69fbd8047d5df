use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ArchiveError;

/// Status of the archive job for one source.
///
/// A job moves from `None`/`Waiting` through any number of `Progress`
/// updates and ends in exactly one of `Done` or `Fail`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ArchiveStatus {
    #[default]
    None,
    Waiting,
    Progress(f64),
    Done(PathBuf),
    Fail(ArchiveError),
}

impl ArchiveStatus {
    /// Progress status with the fraction clamped into `[0, 1]`.
    pub fn progress(fraction: f64) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        ArchiveStatus::Progress(fraction)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ArchiveStatus::Done(_) | ArchiveStatus::Fail(_))
    }

    /// Completed fraction; `None` for failures.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ArchiveStatus::None | ArchiveStatus::Waiting => Some(0.0),
            ArchiveStatus::Progress(p) => Some(*p),
            ArchiveStatus::Done(_) => Some(1.0),
            ArchiveStatus::Fail(_) => None,
        }
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveStatus::None | ArchiveStatus::Waiting => write!(f, "preparing"),
            ArchiveStatus::Progress(p) if *p == 0.0 => write!(f, "preparing"),
            ArchiveStatus::Progress(p) => write!(f, "archiving {}%", (p * 100.0) as u32),
            ArchiveStatus::Done(_) => write!(f, "archived"),
            ArchiveStatus::Fail(e) => write!(f, "failed: {}", e),
        }
    }
}
