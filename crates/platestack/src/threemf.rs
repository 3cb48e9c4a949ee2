//! Plate extraction from sliced 3MF archives.
//!
//! Sliced 3MF files are ZIP containers. Bambu Studio and OrcaSlicer store one
//! G-code member per plate at `Metadata/plate_<n>.gcode`; other exporters put
//! G-code elsewhere, so any `.gcode` member is accepted when no conventional
//! plate is present.

use std::io::{Cursor, Read};
use std::sync::Arc;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::CombinerConfig;
use crate::error::{PlateStackError, Result};
use crate::estimate::estimate_from_text;

/// Largest up-front buffer reserved for a member, whatever size it declares.
const READ_HINT_LIMIT: u64 = 1 << 24;

/// An uploaded job archive. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone)]
pub struct JobArchive {
    /// File name as uploaded.
    pub name: String,
    /// Raw archive bytes.
    pub bytes: Arc<[u8]>,
}

impl JobArchive {
    /// Wrap uploaded bytes.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// One printable plate extracted from an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    /// 1-based plate index within the source archive.
    pub plate_index: u32,
    /// Archive member the G-code was read from.
    pub member_name: String,
    /// G-code text.
    pub gcode: Arc<str>,
    /// Number of lines in the G-code.
    pub line_count: usize,
    /// Slicer time estimate, if the G-code carries one.
    pub estimated_time: Option<String>,
}

impl PlateRecord {
    fn new(plate_index: u32, member_name: String, gcode: String) -> Self {
        let line_count = gcode.lines().count();
        let estimated_time = estimate_from_text(&gcode);
        tracing::debug!(
            plate = plate_index,
            member = %member_name,
            lines = line_count,
            estimate = ?estimated_time,
            "found plate"
        );
        Self {
            plate_index,
            member_name,
            gcode: gcode.into(),
            line_count,
            estimated_time,
        }
    }
}

/// Extract plates using the default [`CombinerConfig`].
pub fn extract(bytes: &[u8], file_name: &str) -> Result<Vec<PlateRecord>> {
    extract_with(bytes, file_name, &CombinerConfig::default())
}

/// Extract every plate's G-code from an archive.
///
/// Conventional members `plate_1` through `plate_<max_plates>` are looked up in
/// order. If none exist, every non-directory member ending in the G-code
/// extension is used, sorted by name and numbered from 1.
pub fn extract_with(
    bytes: &[u8],
    file_name: &str,
    config: &CombinerConfig,
) -> Result<Vec<PlateRecord>> {
    let mut archive = open_archive(bytes, file_name)?;

    let mut plates = Vec::new();
    for index in 1..=config.max_plates {
        let member = config.plate_member(index);
        if let Some(gcode) = read_member(&mut archive, &member, file_name)? {
            plates.push(PlateRecord::new(index, member, gcode));
        }
    }

    if plates.is_empty() {
        let mut members: Vec<String> = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| invalid_archive(file_name, e))?;
            if !entry.is_dir() && entry.name().ends_with(config.gcode_extension.as_str()) {
                members.push(entry.name().to_string());
            }
        }
        members.sort();

        if !members.is_empty() {
            tracing::warn!(
                file = %file_name,
                members = members.len(),
                "no conventional plate members, falling back to G-code member scan"
            );
        }

        for (position, member) in members.into_iter().enumerate() {
            let gcode = read_member(&mut archive, &member, file_name)?
                .ok_or_else(|| invalid_archive(file_name, ZipError::FileNotFound))?;
            plates.push(PlateRecord::new(position as u32 + 1, member, gcode));
        }
    }

    if plates.is_empty() {
        return Err(PlateStackError::NoGCodeFound {
            file: file_name.to_string(),
        });
    }

    tracing::info!(file = %file_name, plates = plates.len(), "extracted plates");
    Ok(plates)
}

/// List member names of an archive in directory order.
pub fn list_members(bytes: &[u8], file_name: &str) -> Result<Vec<String>> {
    let archive = open_archive(bytes, file_name)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

fn open_archive<'a>(bytes: &'a [u8], file_name: &str) -> Result<ZipArchive<Cursor<&'a [u8]>>> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| invalid_archive(file_name, e))
}

/// Read a member as text, or `None` if the archive has no such member.
fn read_member<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    member: &str,
    file_name: &str,
) -> Result<Option<String>> {
    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(invalid_archive(file_name, e)),
    };

    // The declared size is untrusted; only use it as a bounded hint.
    let declared = entry.size();
    let mut raw = Vec::with_capacity(declared.min(READ_HINT_LIMIT) as usize);
    entry
        .read_to_end(&mut raw)
        .map_err(|e| invalid_archive(file_name, e))?;
    if raw.len() as u64 != declared {
        return Err(invalid_archive(
            file_name,
            format!("{member} declares {declared} bytes but holds {}", raw.len()),
        ));
    }

    Ok(Some(match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }))
}

fn invalid_archive(file_name: &str, reason: impl ToString) -> PlateStackError {
    PlateStackError::InvalidArchive {
        file: file_name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_archive(members: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default();
        for (name, contents) in members {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(contents.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_extract_conventional_plates_in_order() {
        let bytes = build_archive(&[
            ("Metadata/plate_2.gcode", "G1 X2\n"),
            ("3D/3dmodel.model", "<model/>"),
            ("Metadata/plate_1.gcode", "G1 X1\nG1 X1\n"),
            ("Metadata/plate_1.gcode.md5", "abc"),
        ]);
        let plates = extract(&bytes, "job.gcode.3mf").unwrap();
        assert_eq!(plates.len(), 2);
        assert_eq!(plates[0].plate_index, 1);
        assert_eq!(plates[0].member_name, "Metadata/plate_1.gcode");
        assert_eq!(plates[0].line_count, 2);
        assert_eq!(plates[1].plate_index, 2);
        assert_eq!(&*plates[1].gcode, "G1 X2\n");
    }

    #[test]
    fn test_extract_skips_gaps() {
        let bytes = build_archive(&[
            ("Metadata/plate_1.gcode", "G28\n"),
            ("Metadata/plate_3.gcode", "G28\n"),
        ]);
        let indices: Vec<u32> = extract(&bytes, "gap.3mf")
            .unwrap()
            .iter()
            .map(|p| p.plate_index)
            .collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_extract_ignores_plates_above_limit() {
        let bytes = build_archive(&[
            ("Metadata/plate_16.gcode", "G28\n"),
            ("Metadata/plate_17.gcode", "G28\n"),
        ]);
        let plates = extract(&bytes, "many.3mf").unwrap();
        assert_eq!(plates.len(), 1);
        assert_eq!(plates[0].plate_index, 16);
    }

    #[test]
    fn test_extract_fallback_sorted() {
        let bytes = build_archive(&[
            ("gcode/", ""),
            ("b.gcode", "G1 B\n"),
            ("a.gcode", "G1 A\n"),
            ("notes.txt", "hello"),
        ]);
        let plates = extract(&bytes, "custom.3mf").unwrap();
        assert_eq!(plates.len(), 2);
        assert_eq!(plates[0].member_name, "a.gcode");
        assert_eq!(plates[0].plate_index, 1);
        assert_eq!(plates[1].member_name, "b.gcode");
        assert_eq!(plates[1].plate_index, 2);
    }

    #[test]
    fn test_extract_fallback_unused_when_conventional_present() {
        let bytes = build_archive(&[
            ("a.gcode", "G1 A\n"),
            ("Metadata/plate_1.gcode", "G1 P\n"),
        ]);
        let plates = extract(&bytes, "mixed.3mf").unwrap();
        assert_eq!(plates.len(), 1);
        assert_eq!(plates[0].member_name, "Metadata/plate_1.gcode");
    }

    #[test]
    fn test_extract_no_gcode() {
        let bytes = build_archive(&[("3D/3dmodel.model", "<model/>")]);
        match extract(&bytes, "project.3mf") {
            Err(PlateStackError::NoGCodeFound { file }) => assert_eq!(file, "project.3mf"),
            other => panic!("expected NoGCodeFound, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_invalid_archive_names_file() {
        let err = extract(b"definitely not a zip", "broken.3mf").unwrap_err();
        assert!(matches!(err, PlateStackError::InvalidArchive { .. }));
        assert!(err.to_string().contains("broken.3mf"));

        let mut truncated = build_archive(&[("Metadata/plate_1.gcode", "G28\n")]);
        truncated.truncate(truncated.len() / 2);
        assert!(matches!(
            extract(&truncated, "cut.3mf"),
            Err(PlateStackError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_extract_oversized_declared_size() {
        let mut bytes = build_archive(&[("Metadata/plate_1.gcode", "G28\n")]);
        let header = bytes
            .windows(4)
            .rposition(|w| w == b"PK\x01\x02")
            .unwrap();
        // Uncompressed size field of the central directory entry.
        bytes[header + 24..header + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let err = extract(&bytes, "evil.3mf").unwrap_err();
        assert!(matches!(err, PlateStackError::InvalidArchive { .. }));
        assert!(err.to_string().contains("evil.3mf"));
    }

    #[test]
    fn test_line_count_of_empty_and_unterminated_plates() {
        let bytes = build_archive(&[
            ("Metadata/plate_1.gcode", ""),
            ("Metadata/plate_2.gcode", "G28\nG1 X1"),
            ("Metadata/plate_3.gcode", "G28\r\nG1 X1\r\n"),
        ]);
        let counts: Vec<usize> = extract(&bytes, "lines.3mf")
            .unwrap()
            .iter()
            .map(|p| p.line_count)
            .collect();
        assert_eq!(counts, vec![0, 2, 2]);
    }

    #[test]
    fn test_line_count_and_estimate() {
        let bytes = build_archive(&[(
            "Metadata/plate_1.gcode",
            "; total estimated time: 1h 2m\nG28\nG1 X1\n",
        )]);
        let plate = &extract(&bytes, "job.3mf").unwrap()[0];
        assert_eq!(plate.line_count, 3);
        assert_eq!(plate.estimated_time.as_deref(), Some("1h 2m"));
    }

    #[test]
    fn test_custom_config() {
        let bytes = build_archive(&[("plates/p1.nc", "G28\n"), ("plates/p2.nc", "G28\n")]);
        let config = CombinerConfig {
            plate_member_prefix: "plates/p".into(),
            gcode_extension: ".nc".into(),
            max_plates: 1,
            ..Default::default()
        };
        let plates = extract_with(&bytes, "cnc.zip", &config).unwrap();
        assert_eq!(plates.len(), 1);
        assert_eq!(plates[0].member_name, "plates/p1.nc");
    }

    #[test]
    fn test_list_members() {
        let bytes = build_archive(&[("b.gcode", ""), ("a.gcode", "")]);
        let mut names = list_members(&bytes, "x.3mf").unwrap();
        names.sort();
        assert_eq!(names, vec!["a.gcode", "b.gcode"]);
    }
}
