//! Session export: the concatenated video and the detection manifest.
//!
//! Both artifacts are built from the final session buffer and the detection
//! log, then handed to an `ExportSink` as two independent downloads. An empty
//! session is not an error; it yields a zero-length video and a header-only
//! manifest.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::detection_log::DetectionLog;
use crate::ingest::encoder::MediaSegment;

pub const DEFAULT_VIDEO_FILE_NAME: &str = "recorded_video.webm";
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "detected_objects.txt";
pub const VIDEO_MIME: &str = "video/webm";
pub const MANIFEST_MIME: &str = "text/plain";

/// One downloadable artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Destination for exported downloads.
pub trait ExportSink: Send + Sync {
    fn deliver(&self, download: Download) -> Result<()>;
}

/// Writes each download as a file in a directory, created on first use.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn deliver(&self, download: Download) -> Result<()> {
        if download.file_name.contains(['/', '\\']) || download.file_name.is_empty() {
            return Err(anyhow!("invalid download file name '{}'", download.file_name));
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create export dir {}", self.dir.display()))?;
        let path = self.dir.join(&download.file_name);
        std::fs::write(&path, &download.bytes)
            .with_context(|| format!("write {}", path.display()))?;
        log::info!("export written to {}", path.display());
        Ok(())
    }
}

/// Keeps downloads in memory.
#[derive(Default)]
pub struct MemorySink {
    downloads: Mutex<Vec<Download>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<Download> {
        self.downloads
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn find(&self, file_name: &str) -> Option<Download> {
        self.downloads()
            .into_iter()
            .find(|d| d.file_name == file_name)
    }
}

impl ExportSink for MemorySink {
    fn deliver(&self, download: Download) -> Result<()> {
        self.downloads
            .lock()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?
            .push(download);
        Ok(())
    }
}

/// File names used for the two downloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportNames {
    pub video: String,
    pub manifest: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            video: DEFAULT_VIDEO_FILE_NAME.to_string(),
            manifest: DEFAULT_MANIFEST_FILE_NAME.to_string(),
        }
    }
}

/// Summary of one export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub segments: usize,
    pub annotated_segments: usize,
    pub video_bytes: usize,
    pub video_sha256: String,
    pub manifest_entries: usize,
    /// No segments and no logged detections.
    pub empty: bool,
    pub video_delivered: bool,
    pub manifest_delivered: bool,
}

/// Render the manifest text.
///
/// ```text
/// Detected Objects:
/// Object 1: cat
/// Bounding Box: (10, 20, 30, 40)
///
/// ```
pub fn render_manifest(log: &DetectionLog) -> String {
    let mut out = String::from("Detected Objects:\n");
    for (index, detection) in log.entries().iter().enumerate() {
        let b = &detection.bbox;
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "Object {}: {}\nBounding Box: ({}, {}, {}, {})\n\n",
            index + 1,
            detection.class,
            b.x,
            b.y,
            b.width,
            b.height
        );
    }
    out
}

/// Concatenate segments in order into one artifact.
pub fn concat_segments<'a, I>(segments: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a MediaSegment>,
{
    let mut out = Vec::new();
    for segment in segments {
        out.extend_from_slice(segment.data());
    }
    out
}

/// Build both artifacts and deliver them independently.
///
/// A failed delivery is logged and reflected in the report; it does not stop
/// the other one.
pub fn export_session(
    segments: &[MediaSegment],
    log: &DetectionLog,
    names: &ExportNames,
    sink: &dyn ExportSink,
) -> ExportReport {
    let video = concat_segments(segments);
    let manifest = render_manifest(log);
    let video_sha256 = hex::encode(Sha256::digest(&video));

    let report = ExportReport {
        segments: segments.len(),
        annotated_segments: segments.iter().filter(|s| s.annotated).count(),
        video_bytes: video.len(),
        video_sha256,
        manifest_entries: log.len(),
        empty: segments.is_empty() && log.is_empty(),
        video_delivered: false,
        manifest_delivered: false,
    };
    if report.empty {
        log::info!("exporting empty session");
    }

    let video_delivered = deliver(
        sink,
        Download {
            file_name: names.video.clone(),
            mime: VIDEO_MIME.to_string(),
            bytes: video,
        },
    );
    let manifest_delivered = deliver(
        sink,
        Download {
            file_name: names.manifest.clone(),
            mime: MANIFEST_MIME.to_string(),
            bytes: manifest.into_bytes(),
        },
    );

    ExportReport {
        video_delivered,
        manifest_delivered,
        ..report
    }
}

fn deliver(sink: &dyn ExportSink, download: Download) -> bool {
    let name = download.file_name.clone();
    match sink.deliver(download) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("download {} failed: {}", name, e);
            false
        }
    }
}
