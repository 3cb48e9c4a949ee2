#![warn(missing_docs)]

//! Combine sliced 3MF print jobs into a single job.
//!
//! Each uploaded `.gcode.3mf` archive contributes one queue entry per plate.
//! The queue is arranged and given copy counts by the caller, then combined
//! into one G-code stream that prints every plate in order. The stream is
//! packaged into the first file's archive so the printer sees the same
//! metadata it would for a normal sliced job.
//!
//! # Example
//!
//! ```ignore
//! use platestack::WorkQueue;
//!
//! let queue = WorkQueue::new();
//! let files = queue.process_upload("bracket.gcode.3mf", std::fs::read("bracket.gcode.3mf")?)?;
//! let id = files[0].id.clone();
//! let queue = queue.append(files).set_copies(&id, 3)?;
//!
//! println!("Estimated: {:?}", queue.estimate_total());
//! let output = queue.combine_and_package()?;
//! std::fs::write(&output.file_name, &output.archive)?;
//! ```

pub mod combine;
pub mod config;
pub mod error;
pub mod estimate;
pub mod queue;
pub mod threemf;

pub use combine::{combine, combine_and_package, output_file_name, repackage, CombinedOutput};
pub use config::{CombinerConfig, MAX_COPIES};
pub use error::{PlateStackError, Result};
pub use estimate::{aggregate_time, estimate_from_text, format_duration, parse_duration_to_seconds};
pub use queue::{
    clamp_copies, BatchOutcome, BatchProgress, SelectableFile, Upload, UploadFailure, WorkQueue,
};
pub use threemf::{extract, extract_with, list_members, JobArchive, PlateRecord};
