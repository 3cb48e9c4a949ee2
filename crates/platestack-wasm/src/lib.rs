//! WASM bindings for platestack.

use platestack::{
    BatchOutcome, BatchProgress, CombinedOutput, CombinerConfig, Upload, UploadFailure, WorkQueue,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(e: impl ToString) -> JsError {
    JsError::new(&e.to_string())
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(js_error)
}

/// Work queue for the browser UI.
///
/// Each mutating call swaps in a new queue snapshot; `files()` always
/// returns a fresh array.
#[wasm_bindgen]
pub struct WasmWorkQueue {
    inner: WorkQueue,
}

#[wasm_bindgen]
impl WasmWorkQueue {
    /// Create an empty queue with default settings.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: WorkQueue::new(),
        }
    }

    /// Create an empty queue from a JSON config.
    #[wasm_bindgen(js_name = fromConfigJson)]
    pub fn from_config_json(json: &str) -> Result<WasmWorkQueue, JsError> {
        let config: CombinerConfig = serde_json::from_str(json).map_err(js_error)?;
        let inner = WorkQueue::with_config(config).map_err(js_error)?;
        Ok(Self { inner })
    }

    /// Extract an uploaded archive and append its plates.
    ///
    /// Returns the added files.
    #[wasm_bindgen(js_name = processUpload)]
    pub fn process_upload(&mut self, name: &str, bytes: &[u8]) -> Result<JsValue, JsError> {
        let files = self
            .inner
            .process_upload(name, bytes.to_vec())
            .map_err(js_error)?;
        let value = to_js(&files)?;
        self.inner = self.inner.append(files);
        Ok(value)
    }

    /// Extract several uploads in order and append their plates.
    ///
    /// `buffers` holds one `Uint8Array` per name. Failing files do not stop
    /// the batch; they are returned as `{ added, failures }`. `onProgress`,
    /// if given, receives `{ completed, total, currentFile }` before each file
    /// and once at the end.
    #[wasm_bindgen(js_name = processBatch)]
    pub fn process_batch(
        &mut self,
        names: Vec<String>,
        buffers: js_sys::Array,
        on_progress: Option<js_sys::Function>,
    ) -> Result<JsValue, JsError> {
        let buffers: Vec<Vec<u8>> = buffers
            .iter()
            .map(|buffer| js_sys::Uint8Array::new(&buffer).to_vec())
            .collect();
        let uploads = pair_uploads(names, buffers).map_err(js_error)?;

        let mut callback_error = None;
        let outcome = self.inner.process_batch(uploads, |progress| {
            let Some(callback) = &on_progress else {
                return;
            };
            if callback_error.is_some() {
                return;
            }
            if let Err(e) = notify(callback, progress) {
                callback_error = Some(e);
            }
        });

        let summary = BatchSummary::from(&outcome);
        self.inner = outcome.queue;
        if let Some(e) = callback_error {
            return Err(e);
        }
        to_js(&summary)
    }

    /// Files in queue order.
    pub fn files(&self) -> Result<JsValue, JsError> {
        to_js(self.inner.files())
    }

    /// Number of files.
    #[wasm_bindgen(getter)]
    pub fn length(&self) -> usize {
        self.inner.len()
    }

    /// Rearrange the queue into the given order of ids.
    pub fn reorder(&mut self, ids: Vec<String>) -> Result<(), JsError> {
        self.inner = self.inner.reorder(&ids).map_err(js_error)?;
        Ok(())
    }

    /// Move one file to a new position.
    #[wasm_bindgen(js_name = moveFile)]
    pub fn move_file(&mut self, id: &str, index: usize) -> Result<(), JsError> {
        self.inner = self.inner.move_file(id, index).map_err(js_error)?;
        Ok(())
    }

    /// Set a file's copy count. Out-of-range values are clamped.
    ///
    /// Returns the stored count.
    #[wasm_bindgen(js_name = setCopies)]
    pub fn set_copies(&mut self, id: &str, copies: f64) -> Result<u32, JsError> {
        let requested = if copies.is_nan() { 1 } else { copies.trunc() as i64 };
        self.inner = self.inner.set_copies(id, requested).map_err(js_error)?;
        Ok(self.inner.get(id).map_or(1, |f| f.copies))
    }

    /// Remove a file.
    pub fn remove(&mut self, id: &str) -> Result<(), JsError> {
        self.inner = self.inner.remove(id).map_err(js_error)?;
        Ok(())
    }

    /// Remove every file.
    pub fn clear(&mut self) {
        self.inner = self.inner.clear();
    }

    /// Total print time, or `undefined` when no file has an estimate.
    #[wasm_bindgen(js_name = estimateTotal)]
    pub fn estimate_total(&self) -> Option<String> {
        self.inner.estimate_total()
    }

    /// Total number of prints, counting copies.
    #[wasm_bindgen(getter, js_name = totalPrints)]
    pub fn total_prints(&self) -> u32 {
        self.inner.total_prints()
    }

    /// Combine the queue and package it for download.
    #[wasm_bindgen(js_name = combineAndPackage)]
    pub fn combine_and_package(&self) -> Result<WasmCombinedOutput, JsError> {
        let inner = self.inner.combine_and_package().map_err(js_error)?;
        Ok(WasmCombinedOutput { inner })
    }
}

impl Default for WasmWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch result handed back to JS.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    added: usize,
    failures: Vec<UploadFailure>,
}

impl From<&BatchOutcome> for BatchSummary {
    fn from(outcome: &BatchOutcome) -> Self {
        Self {
            added: outcome.added,
            failures: outcome.failures.clone(),
        }
    }
}

fn pair_uploads(names: Vec<String>, buffers: Vec<Vec<u8>>) -> Result<Vec<Upload>, String> {
    if names.len() != buffers.len() {
        return Err(format!(
            "got {} names but {} buffers",
            names.len(),
            buffers.len()
        ));
    }
    Ok(names
        .into_iter()
        .zip(buffers)
        .map(|(name, bytes)| Upload { name, bytes })
        .collect())
}

fn notify(callback: &js_sys::Function, progress: &BatchProgress) -> Result<(), JsError> {
    let value = to_js(progress)?;
    callback
        .call1(&JsValue::NULL, &value)
        .map_err(|e| JsError::new(&format!("progress callback failed: {e:?}")))?;
    Ok(())
}

/// Combined job for WASM.
#[wasm_bindgen]
pub struct WasmCombinedOutput {
    inner: CombinedOutput,
}

#[wasm_bindgen]
impl WasmCombinedOutput {
    /// Packaged archive bytes.
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.inner.archive.as_slice())
    }

    /// Suggested download name.
    #[wasm_bindgen(getter, js_name = fileName)]
    pub fn file_name(&self) -> String {
        self.inner.file_name.clone()
    }

    /// Combined G-code text.
    #[wasm_bindgen(getter)]
    pub fn gcode(&self) -> String {
        self.inner.gcode.clone()
    }

    /// Number of prints, counting copies.
    #[wasm_bindgen(getter, js_name = totalPrints)]
    pub fn total_prints(&self) -> u32 {
        self.inner.total_prints
    }

    /// Total time estimate.
    #[wasm_bindgen(getter, js_name = estimatedTime)]
    pub fn estimated_time(&self) -> Option<String> {
        self.inner.estimated_time.clone()
    }
}

/// Format seconds as `"1h 2m 3s"`.
#[wasm_bindgen(js_name = formatDuration)]
pub fn format_duration(seconds: f64) -> String {
    platestack::format_duration(seconds.max(0.0) as u64)
}

/// Parse a duration string into seconds.
#[wasm_bindgen(js_name = parseDuration)]
pub fn parse_duration(text: &str) -> f64 {
    platestack::parse_duration_to_seconds(text) as f64
}

/// Read the slicer's time estimate from G-code text.
#[wasm_bindgen(js_name = estimateFromText)]
pub fn estimate_from_text(gcode: &str) -> Option<String> {
    platestack::estimate_from_text(gcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_default_empty() {
        let queue = WasmWorkQueue::new();
        assert_eq!(queue.length(), 0);
        assert_eq!(queue.total_prints(), 0);
        assert_eq!(queue.estimate_total(), None);
    }

    fn sliced_job(gcode: &str) -> Vec<u8> {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;

        let mut buffer = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buffer);
        zip.start_file("Metadata/plate_1.gcode", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(gcode.as_bytes()).unwrap();
        zip.finish().unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_pair_uploads_requires_matching_lengths() {
        let uploads = pair_uploads(vec!["a.3mf".into()], vec![vec![1, 2]]).unwrap();
        assert_eq!(uploads[0].name, "a.3mf");
        assert_eq!(uploads[0].bytes, vec![1, 2]);
        assert!(pair_uploads(vec!["a.3mf".into(), "b.3mf".into()], vec![vec![]]).is_err());
    }

    #[test]
    fn test_batch_summary_lists_failures() {
        let uploads = pair_uploads(
            vec!["bad.3mf".into(), "good.3mf".into()],
            vec![b"junk".to_vec(), sliced_job("G28\n")],
        )
        .unwrap();
        let outcome = WorkQueue::new().process_batch(uploads, |_| {});
        let summary = BatchSummary::from(&outcome);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file_name, "bad.3mf");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["added"], 1);
        assert_eq!(json["failures"][0]["fileName"], "bad.3mf");
    }

    #[test]
    fn test_duration_helpers() {
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
        assert_eq!(format_duration(-4.0), "0s");
        assert_eq!(parse_duration("1m 30s"), 90.0);
    }
}
