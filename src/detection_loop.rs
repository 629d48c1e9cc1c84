//! The detect -> filter -> publish -> log cycle.
//!
//! One cycle per camera frame, strictly sequential: the loop owns its detector,
//! so a second cycle cannot start on the same model until the first has
//! published. The loop ends when the stream goes inactive, the camera runs
//! out of frames, or the detector fails. Nothing is retried. On any exit the
//! current-set slot is reset to an empty set, so the overlay and the recorder
//! stop showing boxes together.

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::detect::{DetectionSet, DetectorBackend};
use crate::detection_log::SharedDetectionLog;
use crate::ingest::camera::CameraStream;

/// Why the detection loop stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LoopExit {
    /// Stream became inactive or ran out of frames.
    StreamEnded,
    /// The backend reported an unrecoverable error.
    DetectorFailure(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub exit: LoopExit,
    pub cycles: u64,
    pub detections_logged: u64,
}

pub struct DetectionLoop<C> {
    camera: C,
    detector: Box<dyn DetectorBackend>,
    publisher: watch::Sender<DetectionSet>,
    log: SharedDetectionLog,
    active: watch::Receiver<bool>,
}

impl<C: CameraStream> DetectionLoop<C> {
    /// `publisher` must be the only sender for the current-set slot.
    pub fn new(
        camera: C,
        detector: Box<dyn DetectorBackend>,
        publisher: watch::Sender<DetectionSet>,
        log: SharedDetectionLog,
        active: watch::Receiver<bool>,
    ) -> Self {
        Self {
            camera,
            detector,
            publisher,
            log,
            active,
        }
    }

    pub async fn run(mut self) -> LoopReport {
        let mut cycles = 0u64;
        let mut logged = 0u64;
        let backend = self.detector.name();
        log::info!("detection loop started (backend={})", backend);

        let exit = loop {
            if !*self.active.borrow() {
                break LoopExit::StreamEnded;
            }

            let next = tokio::select! {
                biased;
                _ = stream_stopped(&mut self.active) => break LoopExit::StreamEnded,
                next = self.camera.next_frame() => next,
            };
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break LoopExit::StreamEnded,
                Err(e) => {
                    log::warn!("camera stream failed, stopping detection: {}", e);
                    break LoopExit::StreamEnded;
                }
            };

            cycles += 1;
            let set = match self.detector.detect(&frame) {
                Ok(raw) => DetectionSet::from_raw(cycles, frame.captured_at_ms, raw),
                Err(e) => {
                    log::warn!("detector {} failed on cycle {}: {}", backend, cycles, e);
                    break LoopExit::DetectorFailure(e.to_string());
                }
            };

            log::debug!("cycle {}: {} detections above threshold", cycles, set.len());
            self.publisher.send_replace(set.clone());
            match self.log.append_set(&set) {
                Ok(()) => logged += set.len() as u64,
                Err(e) => log::error!("cycle {}: detections not logged: {}", cycles, e),
            }

            tokio::task::yield_now().await;
        };

        self.publisher.send_replace(DetectionSet::empty());

        log::info!(
            "detection loop stopped after {} cycles ({:?})",
            cycles,
            exit
        );
        LoopReport {
            exit,
            cycles,
            detections_logged: logged,
        }
    }
}

impl<C: CameraStream + 'static> DetectionLoop<C> {
    pub fn spawn(self) -> JoinHandle<LoopReport> {
        tokio::spawn(self.run())
    }
}

/// Resolves once the stream flag reads false or its handle is gone.
async fn stream_stopped(active: &mut watch::Receiver<bool>) {
    let _ = active.wait_for(|active| !*active).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, RawDetection, ScriptedBackend};
    use crate::frame::Frame;
    use crate::ingest::camera::{ChannelCamera, StreamHandle};

    fn raw(class: &str, score: f32) -> RawDetection {
        RawDetection::new(class, score, BoundingBox::new(0.0, 0.0, 4.0, 4.0))
    }

    fn frame(seq: u64) -> Frame {
        Frame::filled(4, 4, seq, [0, 0, 0]).unwrap()
    }

    #[tokio::test]
    async fn publishes_filtered_sets_and_logs_them() {
        let (tx, camera) = ChannelCamera::channel(4);
        let backend = ScriptedBackend::new(vec![
            vec![raw("cat", 0.9), raw("chair", 0.66)],
            vec![raw("dog", 0.7), raw("cup", 0.2), raw("person", 0.95)],
        ]);
        let (publisher, current) = watch::channel(DetectionSet::empty());
        let log = SharedDetectionLog::new();
        let stream = StreamHandle::new();
        let handle = DetectionLoop::new(
            camera,
            Box::new(backend),
            publisher,
            log.clone(),
            stream.subscribe(),
        )
        .spawn();

        tx.send(frame(1)).await.unwrap();
        tx.send(frame(2)).await.unwrap();
        drop(tx);
        let report = handle.await.unwrap();

        assert_eq!(report.exit, LoopExit::StreamEnded);
        assert_eq!(report.cycles, 2);
        assert_eq!(report.detections_logged, 3);

        assert!(current.borrow().is_empty());

        let logged: Vec<String> = log
            .snapshot()
            .unwrap()
            .entries()
            .iter()
            .map(|d| d.class.clone())
            .collect();
        assert_eq!(logged, vec!["cat", "dog", "person"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_never_see_a_mix_of_cycles() {
        const CYCLES: u64 = 40;
        let (tx, camera) = ChannelCamera::channel(4);
        let script = (1..=CYCLES).map(|cycle| {
            (0..3)
                .map(|i| {
                    let bbox = BoundingBox::new(cycle as f32, i as f32, 2.0, 2.0);
                    RawDetection::new(format!("c{}", cycle), 0.9, bbox)
                })
                .collect::<Vec<_>>()
        });
        let (publisher, mut current) = watch::channel(DetectionSet::empty());
        let stream = StreamHandle::new();
        let handle = DetectionLoop::new(
            camera,
            Box::new(ScriptedBackend::new(script)),
            publisher,
            SharedDetectionLog::new(),
            stream.subscribe(),
        )
        .spawn();

        let reader = tokio::spawn(async move {
            let mut samples = 0u64;
            loop {
                let set = current.borrow_and_update().clone();
                if set.cycle() == 0 {
                    assert!(set.is_empty());
                } else {
                    assert_eq!(set.len(), 3);
                    let class = format!("c{}", set.cycle());
                    assert!(set.iter().all(|d| d.class == class));
                }
                samples += 1;
                if current.has_changed().is_err() {
                    break samples;
                }
                tokio::task::yield_now().await;
            }
        });

        for seq in 1..=CYCLES {
            tx.send(frame(seq)).await.unwrap();
        }
        drop(tx);
        let report = handle.await.unwrap();
        assert_eq!(report.cycles, CYCLES);
        assert!(reader.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn detector_failure_halts_the_loop() {
        let (tx, camera) = ChannelCamera::channel(4);
        let backend = ScriptedBackend::new(vec![vec![raw("cat", 0.9)]]).fail_on_call(2);
        let (publisher, current) = watch::channel(DetectionSet::empty());
        let stream = StreamHandle::new();
        let handle = DetectionLoop::new(
            camera,
            Box::new(backend),
            publisher,
            SharedDetectionLog::new(),
            stream.subscribe(),
        )
        .spawn();

        for seq in 1..=3 {
            let _ = tx.send(frame(seq)).await;
        }
        let report = handle.await.unwrap();

        assert!(matches!(report.exit, LoopExit::DetectorFailure(_)));
        assert_eq!(report.cycles, 2);
        // The last good set does not outlive the loop.
        assert!(current.borrow().is_empty());
    }

    #[tokio::test]
    async fn inactive_stream_ends_the_loop_without_a_frame() {
        let (_tx, camera) = ChannelCamera::channel(1);
        let (publisher, _current) = watch::channel(DetectionSet::empty());
        let stream = StreamHandle::new();
        let handle = DetectionLoop::new(
            camera,
            Box::new(ScriptedBackend::default()),
            publisher,
            SharedDetectionLog::new(),
            stream.subscribe(),
        )
        .spawn();

        tokio::task::yield_now().await;
        stream.stop();
        let report = handle.await.unwrap();
        assert_eq!(report.exit, LoopExit::StreamEnded);
        assert_eq!(report.cycles, 0);
    }
}
