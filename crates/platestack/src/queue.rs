//! The work queue of selectable files.
//!
//! [`WorkQueue`] is a value: every operation returns a new queue and leaves
//! the receiver untouched, so a UI can keep each snapshot and compare them
//! without relying on identity. Files share their archive bytes and G-code
//! through `Arc`, which keeps snapshots cheap.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::combine::{combine_and_package, CombinedOutput};
use crate::config::{CombinerConfig, MAX_COPIES};
use crate::error::{PlateStackError, Result};
use crate::estimate::aggregate_time;
use crate::threemf::{extract_with, JobArchive, PlateRecord};

/// One plate in the work queue, with its user-chosen copy count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectableFile {
    /// Unique id.
    pub id: String,
    /// Name shown to the user. Carries a plate suffix for multi-plate archives.
    pub display_name: String,
    /// Name of the uploaded archive.
    pub source_name: String,
    /// 1-based plate index within the source archive.
    pub plate_index: u32,
    /// Archive member holding this plate's G-code.
    pub member_name: String,
    /// Number of lines in the G-code.
    pub line_count: usize,
    /// Slicer time estimate for one copy.
    pub estimated_time: Option<String>,
    /// Number of times to print this plate, within `1..=max_copies`.
    pub copies: u32,
    /// Source archive, used as the packaging template when this file is first.
    #[serde(skip)]
    pub archive: JobArchive,
    /// G-code text.
    #[serde(skip)]
    pub gcode: Arc<str>,
}

impl SelectableFile {
    /// Wrap an extracted plate. `plate_count` is the number of plates found
    /// in the same archive.
    pub fn from_plate(archive: &JobArchive, plate: PlateRecord, plate_count: usize) -> Self {
        let display_name = if plate_count > 1 {
            format!("{} (Plate {})", archive.name, plate.plate_index)
        } else {
            archive.name.clone()
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            source_name: archive.name.clone(),
            plate_index: plate.plate_index,
            member_name: plate.member_name,
            line_count: plate.line_count,
            estimated_time: plate.estimated_time,
            copies: 1,
            archive: archive.clone(),
            gcode: plate.gcode,
        }
    }

    /// Copy count clamped into `1..=MAX_COPIES`, whatever `copies` holds.
    pub fn effective_copies(&self) -> u32 {
        clamp_copies(i64::from(self.copies), MAX_COPIES)
    }
}

/// Clamp a requested copy count into `1..=max`.
pub fn clamp_copies(requested: i64, max: u32) -> u32 {
    requested.clamp(1, i64::from(max.max(1))) as u32
}

/// An uploaded file awaiting extraction.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name.
    pub name: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// A file in a batch that could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    /// File name.
    pub file_name: String,
    /// Human-readable reason.
    pub message: String,
}

/// Progress of a batch, reported before each file is processed and once at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// Files finished so far.
    pub completed: usize,
    /// Files in the batch.
    pub total: usize,
    /// File being processed, `None` once the batch is done.
    pub current_file: Option<String>,
}

/// Result of processing a batch of uploads.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Queue with every successfully extracted plate appended.
    pub queue: WorkQueue,
    /// Number of files added to the queue.
    pub added: usize,
    /// Per-file failures, in submission order.
    pub failures: Vec<UploadFailure>,
}

/// Ordered collection of selectable files.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    files: Arc<[SelectableFile]>,
    config: Arc<CombinerConfig>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self {
            files: Vec::new().into(),
            config: Arc::new(CombinerConfig::default()),
        }
    }
}

impl WorkQueue {
    /// Create an empty queue with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with the given settings.
    pub fn with_config(config: CombinerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            files: Vec::new().into(),
            config: Arc::new(config),
        })
    }

    /// Settings used by this queue.
    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Files in queue order.
    pub fn files(&self) -> &[SelectableFile] {
        &self.files
    }

    /// Look up a file by id.
    pub fn get(&self, id: &str) -> Option<&SelectableFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn replace(&self, files: Vec<SelectableFile>) -> Self {
        Self {
            files: files.into(),
            config: Arc::clone(&self.config),
        }
    }

    /// Extract an uploaded archive into selectable files, one per plate.
    ///
    /// The files are returned, not appended; see [`WorkQueue::append`].
    pub fn process_upload(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<SelectableFile>> {
        let archive = JobArchive::new(name, bytes);
        let plates = extract_with(&archive.bytes, name, &self.config)?;
        let count = plates.len();
        Ok(plates
            .into_iter()
            .map(|plate| SelectableFile::from_plate(&archive, plate, count))
            .collect())
    }

    /// Process uploads one at a time in submission order.
    ///
    /// A failing file is recorded in [`BatchOutcome::failures`] and does not
    /// stop the rest of the batch.
    pub fn process_batch(
        &self,
        uploads: Vec<Upload>,
        mut on_progress: impl FnMut(&BatchProgress),
    ) -> BatchOutcome {
        let total = uploads.len();
        let mut files = self.files.to_vec();
        let mut added = 0;
        let mut failures = Vec::new();

        for (completed, upload) in uploads.into_iter().enumerate() {
            on_progress(&BatchProgress {
                completed,
                total,
                current_file: Some(upload.name.clone()),
            });
            match self.process_upload(&upload.name, upload.bytes) {
                Ok(new_files) => {
                    added += new_files.len();
                    files.extend(new_files);
                }
                Err(e) => {
                    tracing::warn!(file = %upload.name, error = %e, "upload failed");
                    failures.push(UploadFailure {
                        file_name: upload.name,
                        message: e.to_string(),
                    });
                }
            }
        }
        on_progress(&BatchProgress {
            completed: total,
            total,
            current_file: None,
        });

        BatchOutcome {
            queue: self.replace(files),
            added,
            failures,
        }
    }

    /// Append files to the end of the queue. Copy counts are clamped.
    pub fn append(&self, new_files: impl IntoIterator<Item = SelectableFile>) -> Self {
        let max = self.config.max_copies;
        let mut files = self.files.to_vec();
        files.extend(new_files.into_iter().map(|mut f| {
            f.copies = clamp_copies(i64::from(f.copies), max);
            f
        }));
        self.replace(files)
    }

    /// Remove a file by id.
    pub fn remove(&self, id: &str) -> Result<Self> {
        if self.get(id).is_none() {
            return Err(PlateStackError::UnknownFile(id.to_string()));
        }
        Ok(self.replace(self.files.iter().filter(|f| f.id != id).cloned().collect()))
    }

    /// Remove every file.
    pub fn clear(&self) -> Self {
        self.replace(Vec::new())
    }

    /// Set a file's copy count, clamped into `1..=max_copies`.
    pub fn set_copies(&self, id: &str, copies: i64) -> Result<Self> {
        let copies = clamp_copies(copies, self.config.max_copies);
        let mut found = false;
        let files: Vec<SelectableFile> = self
            .files
            .iter()
            .map(|f| {
                let mut f = f.clone();
                if f.id == id {
                    f.copies = copies;
                    found = true;
                }
                f
            })
            .collect();
        if !found {
            return Err(PlateStackError::UnknownFile(id.to_string()));
        }
        Ok(self.replace(files))
    }

    /// Rearrange the queue into the given order of ids.
    ///
    /// `order` must name every file exactly once.
    pub fn reorder<S: AsRef<str>>(&self, order: &[S]) -> Result<Self> {
        if order.len() != self.files.len() {
            return Err(PlateStackError::InvalidOrder(format!(
                "expected {} ids, got {}",
                self.files.len(),
                order.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        let mut files = Vec::with_capacity(order.len());
        for id in order {
            let id = id.as_ref();
            if !seen.insert(id) {
                return Err(PlateStackError::InvalidOrder(format!("duplicate id {id}")));
            }
            let file = self
                .get(id)
                .ok_or_else(|| PlateStackError::UnknownFile(id.to_string()))?;
            files.push(file.clone());
        }
        Ok(self.replace(files))
    }

    /// Move one file to `index`, shifting the others. Indices past the end
    /// move the file to the back.
    pub fn move_file(&self, id: &str, index: usize) -> Result<Self> {
        let from = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| PlateStackError::UnknownFile(id.to_string()))?;
        let mut files = self.files.to_vec();
        let file = files.remove(from);
        files.insert(index.min(files.len()), file);
        Ok(self.replace(files))
    }

    /// Total print time over all files and copies.
    pub fn estimate_total(&self) -> Option<String> {
        aggregate_time(&self.files)
    }

    /// Total number of prints, counting copies.
    pub fn total_prints(&self) -> u32 {
        self.files.iter().map(SelectableFile::effective_copies).sum()
    }

    /// Combine the queue into one G-code stream and package it.
    pub fn combine_and_package(&self) -> Result<CombinedOutput> {
        combine_and_package(&self.files, &self.config)
    }
}
