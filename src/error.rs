//! Error taxonomy for the conversion pipeline.
//!
//! Every failure a job can end in is a `ConvertError` variant. All are
//! terminal for the current job; nothing here is retried internally.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Writing or downloading the input into the workspace failed.
    #[error("failed to stage input: {0}")]
    Staging(String),

    /// Input payload rejected at the boundary before any staging write.
    #[error("input is {size} bytes, exceeds the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    /// Converter executable is missing or not runnable.
    #[error("converter unavailable: {0}")]
    ConverterUnavailable(String),

    /// Converter ran and exited non-zero. `diagnostic` is its captured
    /// standard error, verbatim.
    #[error("converter exited with status {exit_code}: {diagnostic}")]
    ConversionFailed { exit_code: i32, diagnostic: String },

    /// Converter did not exit within the configured time; it has been killed.
    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation signal fired mid-job.
    #[error("conversion cancelled by caller")]
    Cancelled,

    /// Converter exited zero but the expected output file does not exist.
    #[error("converter produced no output at {}", .0.display())]
    OutputMissing(PathBuf),

    /// Output file exists but holds nothing usable (zero bytes, or a
    /// transcript that is empty after trimming).
    #[error("converter produced an empty result")]
    OutputEmpty,

    /// Output file exists but is not the expected format.
    #[error("converter output is malformed: {0}")]
    OutputMalformed(String),

    /// Conversion succeeded but delivering the artifact did not.
    #[error("failed to deliver artifact: {0}")]
    RelayFailed(String),
}

/// Coarse classification of a failure, answering the caller's question:
/// does the whole conversion need to run again, or only the delivery step?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing was produced; rerun the conversion.
    NotProduced,
    /// Something was produced but it is unusable; rerun with better input.
    Unusable,
    /// A good artifact exists but was not delivered; retry delivery only.
    Undelivered,
}

impl ConvertError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ConvertError::Staging(_)
            | ConvertError::InputTooLarge { .. }
            | ConvertError::ConverterUnavailable(_)
            | ConvertError::ConversionFailed { .. }
            | ConvertError::Timeout(_)
            | ConvertError::Cancelled => Disposition::NotProduced,
            ConvertError::OutputMissing(_)
            | ConvertError::OutputEmpty
            | ConvertError::OutputMalformed(_) => Disposition::Unusable,
            ConvertError::RelayFailed(_) => Disposition::Undelivered,
        }
    }
}
