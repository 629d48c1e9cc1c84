//! Capture pipeline and recording state machine.
//!
//! ```text
//! Idle --start--> Recording --stop--> Stopping --(drain complete)--> Idle
//! ```
//!
//! `start` clears the detection log (per `LogPolicy`), arms the encoder and
//! spawns a capture worker with a fresh `SessionBuffer`. The worker buffers every
//! non-empty segment on arrival, then composites the overlay on a blocking
//! thread and swaps the annotated version in. `stop` disarms the encoder and
//! tells the worker to close its queue: nothing new is accepted, but segments
//! already queued are still received, and every pending annotation job is
//! joined before the session is exported exactly once. Toggling while
//! `Stopping` is ignored.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::annotate::annotate_segment;
use crate::detect::DetectionSet;
use crate::detection_log::{DetectionLog, LogPolicy, SharedDetectionLog};
use crate::export::{export_session, ExportNames, ExportReport, ExportSink};
use crate::ingest::encoder::{MediaSegment, SegmentEncoder, SegmentSink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Stopping,
}

/// Segments of the current recording, kept in encoder arrival order.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    segments: BTreeMap<u64, MediaSegment>,
    next_seq: u64,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw segment and return its arrival index.
    pub fn accept(&mut self, segment: MediaSegment) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.segments.insert(seq, segment);
        seq
    }

    /// Swap in the annotated version of an accepted segment.
    pub fn replace(&mut self, seq: u64, segment: MediaSegment) -> bool {
        match self.segments.get_mut(&seq) {
            Some(slot) => {
                *slot = segment;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.segments.values().map(MediaSegment::size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaSegment> {
        self.segments.values()
    }

    pub fn into_segments(self) -> Vec<MediaSegment> {
        self.segments.into_values().collect()
    }
}

#[derive(Clone, Debug)]
pub struct RecorderSettings {
    /// Capacity of the encoder -> capture queue.
    pub channel_capacity: usize,
    pub log_policy: LogPolicy,
    pub names: ExportNames,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            log_policy: LogPolicy::default(),
            names: ExportNames::default(),
        }
    }
}

pub struct Recorder {
    encoder: Box<dyn SegmentEncoder>,
    exporter: Arc<dyn ExportSink>,
    detections: watch::Receiver<DetectionSet>,
    log: SharedDetectionLog,
    settings: RecorderSettings,
    state: Arc<watch::Sender<RecordingState>>,
    stop_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<ExportReport>>,
    sessions: u64,
}

impl Recorder {
    pub fn new(
        encoder: Box<dyn SegmentEncoder>,
        exporter: Arc<dyn ExportSink>,
        detections: watch::Receiver<DetectionSet>,
        log: SharedDetectionLog,
        settings: RecorderSettings,
    ) -> Self {
        let (state, _) = watch::channel(RecordingState::Idle);
        Self {
            encoder,
            exporter,
            detections,
            log,
            settings,
            state: Arc::new(state),
            stop_tx: None,
            worker: None,
            sessions: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.state.subscribe()
    }

    /// Number of recordings started so far.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// `Idle -> Recording`. Returns false (and does nothing) in any other state.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(&mut self) -> Result<bool> {
        let state = self.state();
        if state != RecordingState::Idle {
            log::debug!("start ignored while {:?}", state);
            return Ok(false);
        }

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        self.encoder.arm(SegmentSink::new(tx))?;
        if self.settings.log_policy == LogPolicy::ResetOnRecord {
            if let Err(e) = self.log.clear() {
                self.encoder.disarm();
                return Err(e);
            }
        }

        self.sessions += 1;
        self.state.send_replace(RecordingState::Recording);
        let worker = CaptureWorker {
            session: self.sessions,
            segments: rx,
            stop: stop_rx,
            detections: self.detections.clone(),
            log: self.log.clone(),
            exporter: Arc::clone(&self.exporter),
            names: self.settings.names.clone(),
            state: Arc::clone(&self.state),
        };
        self.worker = Some(tokio::spawn(worker.run()));
        self.stop_tx = Some(stop_tx);
        log::info!(
            "recording session {} started (encoder={})",
            self.sessions,
            self.encoder.name()
        );
        Ok(true)
    }

    /// `Recording -> Stopping`. Returns false in any other state.
    pub fn stop(&mut self) -> bool {
        if self.state() != RecordingState::Recording {
            return false;
        }
        self.encoder.disarm();
        let moved = self.state.send_if_modified(|state| {
            if *state == RecordingState::Recording {
                *state = RecordingState::Stopping;
                true
            } else {
                false
            }
        });
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if moved {
            log::info!("recording session {} stopping", self.sessions);
        }
        moved
    }

    /// Start when idle, stop when recording, ignore while stopping.
    pub fn toggle(&mut self) -> Result<bool> {
        match self.state() {
            RecordingState::Idle => self.start(),
            RecordingState::Recording => Ok(self.stop()),
            RecordingState::Stopping => {
                log::debug!("toggle ignored while stopping");
                Ok(false)
            }
        }
    }

    /// Wait for the current session's worker to drain and export.
    ///
    /// Returns `None` if no session was started since the last wait. While
    /// `Recording`, this only returns once something stops the session.
    pub async fn wait_idle(&mut self) -> Result<Option<ExportReport>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        worker
            .await
            .map(Some)
            .map_err(|e| anyhow!("capture worker failed: {}", e))
    }
}

/// Puts the state machine back to `Idle` however the worker exits.
struct IdleOnDrop(Arc<watch::Sender<RecordingState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(RecordingState::Idle);
    }
}

type AnnotationJob = (u64, Result<MediaSegment>);

struct CaptureWorker {
    session: u64,
    segments: mpsc::Receiver<MediaSegment>,
    stop: oneshot::Receiver<()>,
    detections: watch::Receiver<DetectionSet>,
    log: SharedDetectionLog,
    exporter: Arc<dyn ExportSink>,
    names: ExportNames,
    state: Arc<watch::Sender<RecordingState>>,
}

impl CaptureWorker {
    async fn run(mut self) -> ExportReport {
        let _idle = IdleOnDrop(Arc::clone(&self.state));
        let mut buffer = SessionBuffer::new();
        let mut pending: JoinSet<AnnotationJob> = JoinSet::new();
        let mut stopping = false;
        let mut skipped_empty = 0u64;

        loop {
            tokio::select! {
                _ = &mut self.stop, if !stopping => {
                    // Reject new segments; queued ones are still delivered below.
                    self.segments.close();
                    stopping = true;
                }
                next = self.segments.recv() => {
                    let Some(segment) = next else { break };
                    if segment.is_empty() {
                        skipped_empty += 1;
                        continue;
                    }
                    let seq = buffer.accept(segment.clone());
                    let snapshot = self.detections.borrow().clone();
                    pending.spawn_blocking(move || (seq, annotate_segment(&segment, &snapshot)));
                }
                Some(joined) = pending.join_next(), if !pending.is_empty() => {
                    settle(&mut buffer, joined);
                }
            }
        }

        while let Some(joined) = pending.join_next().await {
            settle(&mut buffer, joined);
        }

        let log = self.log.snapshot().unwrap_or_else(|e| {
            log::warn!("detection log unavailable for export: {}", e);
            DetectionLog::new()
        });
        log::info!(
            "recording session {} drained: {} segments, {} bytes, {} empty skipped",
            self.session,
            buffer.len(),
            buffer.total_bytes(),
            skipped_empty
        );
        let segments = buffer.into_segments();
        export_session(&segments, &log, &self.names, self.exporter.as_ref())
    }
}

fn settle(buffer: &mut SessionBuffer, joined: Result<AnnotationJob, JoinError>) {
    match joined {
        Ok((seq, Ok(annotated))) => {
            buffer.replace(seq, annotated);
        }
        Ok((seq, Err(e))) => {
            log::debug!("segment {} recorded without overlay: {:#}", seq, e);
        }
        Err(e) => {
            log::warn!("annotation job failed, raw segment kept: {}", e);
        }
    }
}
