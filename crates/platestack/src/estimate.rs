//! Print time estimates read from slicer comments.

use std::sync::LazyLock;

use regex::Regex;

use crate::queue::SelectableFile;

/// Comment patterns in priority order. The first pattern that matches
/// anywhere in the text wins.
static ESTIMATE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        // PrusaSlicer / SuperSlicer: "; estimated printing time (normal mode) = 1h 2m 3s"
        Regex::new(r"(?mi)^[ \t]*;[ \t]*estimated printing time[^=\r\n]*=[ \t]*(\S[^\r\n]*)")
            .expect("valid estimated printing time regex"),
        // Cura: ";TIME:3723"
        Regex::new(r"(?m)^[ \t]*;[ \t]*TIME_?:?[ \t]*(\d+)[ \t]*\r?$").expect("valid TIME regex"),
        // Bambu Studio / OrcaSlicer: "; model printing time: 1h 2m; total estimated time: 1h 8m 3s"
        Regex::new(r"(?mi)^[ \t]*;[^\r\n]*?total estimated time:[ \t]*([^;\r\n]*[^;\s])")
            .expect("valid total estimated time regex"),
    ]
});

static DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*d").expect("valid days regex"));
static HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*h").expect("valid hours regex"));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*m").expect("valid minutes regex"));
static SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*s").expect("valid seconds regex"));

/// Find the slicer's time estimate in a G-code text.
///
/// Bare integers are taken as seconds and formatted with [`format_duration`];
/// any other value is returned as written by the slicer. Returns `None` when
/// the text carries no estimate.
pub fn estimate_from_text(gcode: &str) -> Option<String> {
    let value = ESTIMATE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(gcode))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim())?;

    if is_all_digits(value) {
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(format_duration(seconds));
        }
    }
    Some(value.to_string())
}

/// Format seconds as `"1h 2m 3s"`, omitting zero components.
///
/// Zero is rendered as `"0s"`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Parse a duration such as `"1h 2m 3s"`, `"2d 4h"`, or `"3723"` into seconds.
///
/// Missing components count as zero, so unparseable text yields 0.
pub fn parse_duration_to_seconds(text: &str) -> u64 {
    let trimmed = text.trim();
    if is_all_digits(trimmed) {
        return trimmed.parse().unwrap_or(u64::MAX);
    }

    let component = |pattern: &Regex, unit: u64| -> u64 {
        pattern
            .captures(trimmed)
            .and_then(|c| c[1].parse::<u64>().ok())
            .map_or(0, |n| n.saturating_mul(unit))
    };

    component(&DAYS, 86_400)
        .saturating_add(component(&HOURS, 3600))
        .saturating_add(component(&MINUTES, 60))
        .saturating_add(component(&SECONDS, 1))
}

/// Total print time of the files, counting every copy.
///
/// Returns `None` when no file carries an estimate. Files without one add
/// nothing to the sum.
pub fn aggregate_time(files: &[SelectableFile]) -> Option<String> {
    let mut found = false;
    let mut total: u64 = 0;
    for file in files {
        if let Some(estimate) = &file.estimated_time {
            found = true;
            let seconds = parse_duration_to_seconds(estimate)
                .saturating_mul(u64::from(file.effective_copies()));
            total = total.saturating_add(seconds);
        }
    }
    found.then(|| format_duration(total))
}

fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
