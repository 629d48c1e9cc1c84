use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use live_annotate::annotate::encode_png;
use live_annotate::{
    AnnotationSession, BoundingBox, ChannelCamera, ExternalEncoder, Frame, LogPolicy,
    MediaSegment, MemorySink, RawDetection, RecorderSettings, RecordingState, ScriptedBackend,
};

struct Rig {
    session: AnnotationSession,
    frames: mpsc::Sender<Frame>,
    encoder: ExternalEncoder,
    sink: Arc<MemorySink>,
}

fn rig(script: Vec<Vec<RawDetection>>, settings: RecorderSettings) -> Rig {
    let (frames, camera) = ChannelCamera::channel(8);
    let encoder = ExternalEncoder::new();
    let sink = Arc::new(MemorySink::new());
    let session = AnnotationSession::enable_camera(
        camera,
        Some(Box::new(ScriptedBackend::new(script))),
        Box::new(encoder.clone()),
        sink.clone(),
        settings,
    );
    Rig {
        session,
        frames,
        encoder,
        sink,
    }
}

fn raw(class: &str, score: f32, b: [f32; 4]) -> RawDetection {
    RawDetection::new(class, score, BoundingBox::new(b[0], b[1], b[2], b[3]))
}

fn frame(seq: u64) -> Frame {
    Frame::filled(32, 32, seq, [10, 10, 10]).expect("frame")
}

fn segment(bytes: &[u8], at: u64) -> MediaSegment {
    MediaSegment::new(bytes.to_vec(), "video/webm", at)
}

async fn wait_for_cycle(session: &AnnotationSession, cycle: u64) {
    let mut viewport = session.viewport();
    while viewport.current().cycle < cycle {
        viewport.changed().await.expect("renderer alive");
    }
}

#[tokio::test]
async fn manifest_lists_every_logged_detection() -> Result<()> {
    let mut rig = rig(
        vec![
            vec![raw("cat", 0.91, [10.0, 20.0, 30.0, 40.0]), raw("cup", 0.66, [0.0, 0.0, 5.0, 5.0])],
            vec![raw("dog", 0.7, [1.0, 2.0, 3.0, 4.0]), raw("car", 0.12, [2.0, 2.0, 2.0, 2.0])],
        ],
        RecorderSettings::default(),
    );

    assert!(rig.session.start_recording()?);
    rig.frames.send(frame(1)).await?;
    rig.frames.send(frame(2)).await?;
    wait_for_cycle(&rig.session, 2).await;

    let current = rig.session.current_detections();
    let classes: Vec<&str> = current.iter().map(|d| d.class.as_str()).collect();
    assert_eq!(classes, vec!["dog"]);

    let still = encode_png(image::RgbImage::new(16, 16))?;
    assert!(rig.encoder.emit(MediaSegment::new(still, "image/png", 1)).await);

    assert!(rig.session.stop_recording());
    let report = rig
        .session
        .wait_recording_idle()
        .await?
        .expect("export report");
    assert_eq!(report.segments, 1);
    assert_eq!(report.annotated_segments, 1);
    assert_eq!(report.manifest_entries, 2);

    let manifest = rig.sink.find("detected_objects.txt").expect("manifest");
    assert_eq!(manifest.mime, "text/plain");
    assert_eq!(
        String::from_utf8(manifest.bytes)?,
        "Detected Objects:\n\
         Object 1: cat\n\
         Bounding Box: (10, 20, 30, 40)\n\
         \n\
         Object 2: dog\n\
         Bounding Box: (1, 2, 3, 4)\n\
         \n"
    );
    let video = rig.sink.find("recorded_video.webm").expect("video");
    assert_eq!(video.mime, "video/webm");

    rig.session.disable_camera().await?;
    Ok(())
}

#[tokio::test]
async fn stopping_twice_exports_once() -> Result<()> {
    let mut rig = rig(Vec::new(), RecorderSettings::default());

    assert!(rig.session.start_recording()?);
    assert!(rig.encoder.emit(segment(b"abc", 0)).await);
    assert!(rig.session.stop_recording());
    assert!(!rig.session.stop_recording());

    assert!(rig.session.wait_recording_idle().await?.is_some());
    assert!(rig.session.wait_recording_idle().await?.is_none());
    assert_eq!(rig.session.recording_state(), RecordingState::Idle);
    assert_eq!(rig.sink.downloads().len(), 2);

    let summary = rig.session.disable_camera().await?;
    assert!(summary.export.is_none());
    assert_eq!(rig.sink.downloads().len(), 2);
    Ok(())
}

#[tokio::test]
async fn in_flight_segments_are_drained_in_order() -> Result<()> {
    let mut rig = rig(Vec::new(), RecorderSettings::default());

    assert!(rig.session.start_recording()?);
    let mut expected = Vec::new();
    for i in 0..12u8 {
        let bytes = [i, i, i];
        expected.extend_from_slice(&bytes);
        assert!(rig.encoder.emit(segment(&bytes, i as u64)).await);
    }
    assert!(rig.session.stop_recording());
    assert!(!rig.encoder.emit(segment(b"late", 99)).await);

    let report = rig.session.wait_recording_idle().await?.expect("report");
    assert_eq!(report.segments, 12);
    assert_eq!(report.annotated_segments, 0);
    assert_eq!(rig.sink.find("recorded_video.webm").expect("video").bytes, expected);

    rig.session.disable_camera().await?;
    Ok(())
}

#[tokio::test]
async fn new_recording_starts_from_an_empty_buffer() -> Result<()> {
    let mut rig = rig(Vec::new(), RecorderSettings::default());

    rig.session.start_recording()?;
    assert!(rig.encoder.emit(segment(b"first", 0)).await);
    assert!(rig.encoder.emit(segment(b"second", 1)).await);
    rig.session.stop_recording();
    let first = rig.session.wait_recording_idle().await?.expect("first report");
    assert_eq!(first.segments, 2);

    assert!(rig.session.toggle_recording()?);
    assert_eq!(rig.session.recording_state(), RecordingState::Recording);
    assert!(rig.encoder.emit(segment(b"third", 2)).await);
    assert!(rig.session.toggle_recording()?);
    assert_eq!(rig.session.recording_state(), RecordingState::Stopping);
    let second = rig.session.wait_recording_idle().await?.expect("second report");
    assert_eq!(second.segments, 1);

    let videos: Vec<Vec<u8>> = rig
        .sink
        .downloads()
        .into_iter()
        .filter(|d| d.file_name == "recorded_video.webm")
        .map(|d| d.bytes)
        .collect();
    assert_eq!(videos, vec![b"firstsecond".to_vec(), b"third".to_vec()]);

    rig.session.disable_camera().await?;
    Ok(())
}

#[tokio::test]
async fn disabling_the_camera_stops_and_exports_the_recording() -> Result<()> {
    let settings = RecorderSettings {
        log_policy: LogPolicy::Session,
        ..RecorderSettings::default()
    };
    let mut rig = rig(vec![vec![raw("person", 0.8, [4.0, 4.0, 8.0, 8.0])]], settings);

    rig.frames.send(frame(1)).await?;
    wait_for_cycle(&rig.session, 1).await;
    rig.session.start_recording()?;
    assert!(rig.encoder.emit(segment(b"chunk", 0)).await);

    let summary = rig.session.disable_camera().await?;
    let detection = summary.detection.expect("loop report");
    assert_eq!(detection.cycles, 1);
    let export = summary.export.expect("forced export");
    assert_eq!(export.segments, 1);
    // Detection from before the recording survives under the session policy.
    assert_eq!(export.manifest_entries, 1);
    assert!(String::from_utf8(rig.sink.find("detected_objects.txt").expect("manifest").bytes)?
        .contains("Object 1: person"));
    Ok(())
}

#[tokio::test]
async fn detector_failure_clears_boxes_from_screen_and_recording() -> Result<()> {
    let (frames, camera) = ChannelCamera::channel(4);
    let encoder = ExternalEncoder::new();
    let sink = Arc::new(MemorySink::new());
    let backend = ScriptedBackend::new(vec![vec![raw("cat", 0.9, [2.0, 2.0, 8.0, 8.0])]])
        .fail_on_call(2);
    let mut session = AnnotationSession::enable_camera(
        camera,
        Some(Box::new(backend)),
        Box::new(encoder.clone()),
        sink.clone(),
        RecorderSettings::default(),
    );

    session.start_recording()?;
    frames.send(frame(1)).await?;
    wait_for_cycle(&session, 1).await;
    assert_eq!(session.overlay().elements.len(), 2);

    frames.send(frame(2)).await?;
    let mut viewport = session.viewport();
    while viewport.changed().await.is_some() {}
    assert!(session.overlay().is_empty());
    assert!(session.current_detections().is_empty());

    let still = encode_png(image::RgbImage::new(16, 16))?;
    assert!(encoder.emit(MediaSegment::new(still, "image/png", 2)).await);
    session.stop_recording();
    let report = session.wait_recording_idle().await?.expect("export report");
    assert_eq!(report.annotated_segments, 1);

    let video = sink.find("recorded_video.webm").expect("video").bytes;
    let composited = image::load_from_memory(&video)?.to_rgba8();
    assert_eq!(composited.get_pixel(2, 2).0, [0, 0, 0, 255]);

    let summary = session.disable_camera().await?;
    assert!(matches!(
        summary.detection.map(|d| d.exit),
        Some(live_annotate::LoopExit::DetectorFailure(_))
    ));
    Ok(())
}
