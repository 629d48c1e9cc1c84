use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection_log::LogPolicy;
use crate::export::{ExportNames, DEFAULT_MANIFEST_FILE_NAME, DEFAULT_VIDEO_FILE_NAME};
use crate::ingest::camera::CameraConfig;
use crate::ingest::encoder::SyntheticEncoderConfig;
use crate::recorder::RecorderSettings;

const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_SEGMENT_INTERVAL_MS: u64 = 250;
const DEFAULT_CHANNEL_CAPACITY: usize = 32;
const DEFAULT_OUTPUT_DIR: &str = "recordings";
const DEFAULT_DETECTOR: &str = "stub";

#[derive(Debug, Deserialize, Default)]
struct AnnotatorConfigFile {
    camera: Option<CameraConfigFile>,
    recorder: Option<RecorderConfigFile>,
    detector: Option<DetectorConfigFile>,
    log_policy: Option<LogPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecorderConfigFile {
    segment_interval_ms: Option<u64>,
    channel_capacity: Option<usize>,
    output_dir: Option<PathBuf>,
    video_file_name: Option<String>,
    manifest_file_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    pub camera: CameraSettings,
    pub recorder: RecordingSettings,
    /// Name of the detector backend to take from the registry.
    pub detector: String,
    pub log_policy: LogPolicy,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub segment_interval: Duration,
    pub channel_capacity: usize,
    pub output_dir: PathBuf,
    pub video_file_name: String,
    pub manifest_file_name: String,
}

impl AnnotatorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANNOTATOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnotatorConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let recorder = file.recorder.unwrap_or_default();
        Self {
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            recorder: RecordingSettings {
                segment_interval: Duration::from_millis(
                    recorder
                        .segment_interval_ms
                        .unwrap_or(DEFAULT_SEGMENT_INTERVAL_MS),
                ),
                channel_capacity: recorder
                    .channel_capacity
                    .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
                output_dir: recorder
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                video_file_name: recorder
                    .video_file_name
                    .unwrap_or_else(|| DEFAULT_VIDEO_FILE_NAME.to_string()),
                manifest_file_name: recorder
                    .manifest_file_name
                    .unwrap_or_else(|| DEFAULT_MANIFEST_FILE_NAME.to_string()),
            },
            detector: file
                .detector
                .and_then(|detector| detector.backend)
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            log_policy: file.log_policy.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ANNOTATOR_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(dir) = std::env::var("ANNOTATOR_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.recorder.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(detector) = std::env::var("ANNOTATOR_DETECTOR") {
            if !detector.trim().is_empty() {
                self.detector = detector.trim().to_string();
            }
        }
        if let Ok(policy) = std::env::var("ANNOTATOR_LOG_POLICY") {
            if !policy.trim().is_empty() {
                self.log_policy = LogPolicy::parse(&policy)?;
            }
        }
        if let Ok(interval) = std::env::var("ANNOTATOR_SEGMENT_INTERVAL_MS") {
            if !interval.trim().is_empty() {
                let millis: u64 = interval.trim().parse().map_err(|_| {
                    anyhow!(
                        "ANNOTATOR_SEGMENT_INTERVAL_MS must be an integer number of milliseconds"
                    )
                })?;
                self.recorder.segment_interval = Duration::from_millis(millis);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !self.camera.url.starts_with("stub://") {
            return Err(anyhow!(
                "unsupported camera url '{}' (only stub:// is built in)",
                self.camera.url
            ));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.recorder.segment_interval.is_zero() {
            return Err(anyhow!("segment interval must be greater than zero"));
        }
        if self.recorder.channel_capacity == 0 {
            return Err(anyhow!("channel capacity must be greater than zero"));
        }
        self.recorder.video_file_name = self.recorder.video_file_name.trim().to_string();
        self.recorder.manifest_file_name = self.recorder.manifest_file_name.trim().to_string();
        for name in [
            &self.recorder.video_file_name,
            &self.recorder.manifest_file_name,
        ] {
            if name.is_empty() {
                return Err(anyhow!("export file names must not be empty"));
            }
        }
        if self.recorder.video_file_name == self.recorder.manifest_file_name {
            return Err(anyhow!("video and manifest file names must differ"));
        }
        Ok(())
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            url: self.camera.url.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
            max_frames: None,
        }
    }

    /// Synthetic segments are rendered at the camera resolution.
    pub fn encoder_config(&self) -> SyntheticEncoderConfig {
        SyntheticEncoderConfig {
            width: self.camera.width,
            height: self.camera.height,
            segment_interval: self.recorder.segment_interval,
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            channel_capacity: self.recorder.channel_capacity,
            log_policy: self.log_policy,
            names: ExportNames {
                video: self.recorder.video_file_name.clone(),
                manifest: self.recorder.manifest_file_name.clone(),
            },
        }
    }
}

fn read_config_file(path: &Path) -> Result<AnnotatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
