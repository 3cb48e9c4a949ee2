//! Error types for platestack.

use thiserror::Error;

/// Errors from extracting, arranging, or combining print jobs.
#[derive(Error, Debug)]
pub enum PlateStackError {
    /// The uploaded bytes are not a readable ZIP container.
    #[error("{file} is not a valid 3MF archive: {reason}")]
    InvalidArchive {
        /// Name of the uploaded file.
        file: String,
        /// Underlying reader error.
        reason: String,
    },

    /// The archive opened, but holds no G-code payload.
    #[error(
        "no G-code found in {file}; export it from the slicer with \"Export plate sliced file\" \
         so the archive contains Metadata/plate_<n>.gcode"
    )]
    NoGCodeFound {
        /// Name of the uploaded file.
        file: String,
    },

    /// The template archive could not be rebuilt with the combined G-code.
    #[error("failed to repackage archive: {0}")]
    RepackageError(String),

    /// Combine was requested with no files selected.
    #[error("no files selected to combine")]
    EmptySelection,

    /// A file id is not present in the work queue.
    #[error("unknown file id: {0}")]
    UnknownFile(String),

    /// A reorder request was not a permutation of the queue.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

/// Result type for platestack operations.
pub type Result<T> = std::result::Result<T, PlateStackError>;
