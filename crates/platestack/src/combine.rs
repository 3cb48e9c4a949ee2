//! Concatenation of queued plates and repackaging into a 3MF archive.

use std::io::{Cursor, Write};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::CombinerConfig;
use crate::error::{PlateStackError, Result};
use crate::estimate::aggregate_time;
use crate::queue::SelectableFile;

const RULE: &str = "; ==================================================";

/// A combined job, ready to download.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedOutput {
    /// Concatenated G-code.
    #[serde(skip)]
    pub gcode: String,
    /// Packaged archive bytes.
    #[serde(skip)]
    pub archive: Vec<u8>,
    /// Suggested download name.
    pub file_name: String,
    /// Number of prints in the job, counting copies.
    pub total_prints: u32,
    /// Total time estimate, if any file carries one.
    pub estimated_time: Option<String>,
}

/// Concatenate the files' G-code in order, repeating each file by its copy
/// count. Every segment is preceded by a comment block naming the source.
pub fn combine(files: &[SelectableFile]) -> Result<String> {
    if files.is_empty() {
        return Err(PlateStackError::EmptySelection);
    }

    let total = total_prints(files);
    let capacity = files.iter().fold(128usize, |acc, f| {
        acc.saturating_add(segment_hint(f.gcode.len(), f.effective_copies()))
    });
    let mut out = String::new();
    let _ = out.try_reserve(capacity);

    out.push_str(&format!("; platestack combined job: {total} prints\n"));

    let mut print = 0;
    for file in files {
        let name = comment_safe(&file.display_name);
        let copies = file.effective_copies();
        for copy in 1..=copies {
            print += 1;
            out.push_str(RULE);
            out.push('\n');
            out.push_str(&format!(
                "; Print {print} of {total}: {name} (plate {}, copy {copy} of {copies})\n",
                file.plate_index
            ));
            out.push_str(RULE);
            out.push('\n');
            out.push_str(&file.gcode);
            if !file.gcode.ends_with('\n') {
                out.push('\n');
            }
        }
    }

    Ok(out)
}

/// Bytes needed for `copies` segments of a `len`-byte plate plus delimiters.
fn segment_hint(len: usize, copies: u32) -> usize {
    len.saturating_add(256).saturating_mul(copies as usize)
}

/// Rebuild the first file's archive with its G-code member replaced by
/// `combined`. Every other member is copied without recompression.
pub fn repackage(files: &[SelectableFile], combined: &str) -> Result<Vec<u8>> {
    let template = files.first().ok_or(PlateStackError::EmptySelection)?;
    let member = template.member_name.as_str();

    let mut archive = ZipArchive::new(Cursor::new(&template.archive.bytes[..]))
        .map_err(|e| repackage_error(&template.archive.name, e))?;

    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let mut replaced = false;

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| repackage_error(&template.archive.name, e))?;

        if entry.name() != member {
            zip.raw_copy_file(entry)
                .map_err(|e| repackage_error(&template.archive.name, e))?;
            continue;
        }

        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let name = entry.name().to_string();
        drop(entry);

        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(combined.len() as u64 >= u32::MAX as u64);
        zip.start_file(name, options)
            .map_err(|e| repackage_error(&template.archive.name, e))?;
        zip.write_all(combined.as_bytes())
            .map_err(|e| repackage_error(&template.archive.name, e))?;
        replaced = true;
    }

    if !replaced {
        return Err(PlateStackError::RepackageError(format!(
            "{} has no member {member}",
            template.archive.name
        )));
    }

    zip.finish()
        .map_err(|e| repackage_error(&template.archive.name, e))?;

    Ok(buffer.into_inner())
}

/// Suggested name of the combined archive.
pub fn output_file_name(files: &[SelectableFile], config: &CombinerConfig) -> String {
    format!("{}_{}_prints.gcode.3mf", config.output_prefix, total_prints(files))
}

/// Number of prints, counting copies clamped into the allowed range.
fn total_prints(files: &[SelectableFile]) -> u32 {
    files.iter().map(SelectableFile::effective_copies).sum()
}

/// Combine the files and package the result.
pub fn combine_and_package(
    files: &[SelectableFile],
    config: &CombinerConfig,
) -> Result<CombinedOutput> {
    let gcode = combine(files)?;
    let archive = repackage(files, &gcode)?;
    let output = CombinedOutput {
        file_name: output_file_name(files, config),
        total_prints: total_prints(files),
        estimated_time: aggregate_time(files),
        gcode,
        archive,
    };
    tracing::info!(
        files = files.len(),
        prints = output.total_prints,
        bytes = output.archive.len(),
        file_name = %output.file_name,
        "combined job"
    );
    Ok(output)
}

/// Keep a file name on a single comment line.
fn comment_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn repackage_error(template: &str, reason: impl ToString) -> PlateStackError {
    PlateStackError::RepackageError(format!("{template}: {}", reason.to_string()))
}
