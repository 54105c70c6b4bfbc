//! src/error.rs
//!
//! Failure taxonomy for the sample pipeline.
//!
//! Every public operation returns `anyhow::Result`, and the root cause of a
//! pipeline failure is always a [`PipelineError`]. Context added on the way
//! up (file paths, stage names) does not hide it:
//!
//! ```ignore
//! match dataset.item(i) {
//!     Ok((image, mask)) => { /* ... */ }
//!     Err(err) => match err.downcast_ref::<PipelineError>() {
//!         Some(PipelineError::Index { .. }) => { /* caller bug */ }
//!         Some(PipelineError::Decode { .. }) => { /* skip this sample */ }
//!         _ => return Err(err),
//!     },
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The manifest is missing, unreadable, or has a malformed row.
    #[error("manifest error at {path} (row {row:?}): {reason}")]
    Manifest {
        path: PathBuf,
        row: Option<usize>,
        reason: String,
    },

    /// An image or label-mask file could not be read or decoded.
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Image and mask disagree in size, or are smaller than the crop target.
    #[error("dimension mismatch: {reason}")]
    Dimension { reason: String },

    /// Requested sample index is outside `[0, len)`.
    #[error("sample index {index} out of range for dataset of length {len}")]
    Index { index: usize, len: usize },

    /// Invalid construction parameters (stage order, crop size, constants).
    #[error("invalid pipeline configuration: {reason}")]
    Config { reason: String },
}

impl PipelineError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(reason: impl Into<String>) -> Self {
        Self::Dimension {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Finds the pipeline error at the root of an `anyhow` chain, if any.
    pub fn classify(err: &anyhow::Error) -> Option<&PipelineError> {
        err.chain().find_map(|cause| cause.downcast_ref::<PipelineError>())
    }
}
