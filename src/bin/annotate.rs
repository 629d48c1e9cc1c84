//! annotate - live detection overlay with an annotated recording window
//!
//! Runs the synthetic camera through the configured detector, records a
//! window of the stream and exports `recorded_video.webm` plus
//! `detected_objects.txt` into the output directory. The export report is
//! printed to stdout as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use live_annotate::{
    AnnotationSession, AnnotatorConfig, DetectorRegistry, DirectorySink, ExportReport,
    StubBackend, SyntheticCamera, SyntheticEncoder,
};

#[path = "../ui.rs"]
mod ui;

const STATUS_REFRESH: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Total camera run time in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Seconds of live view before recording starts.
    #[arg(long, default_value_t = 1)]
    record_after: u64,
    /// Length of the recording window in seconds.
    #[arg(long, default_value_t = 3)]
    record_for: u64,
    /// Camera frame rate (overrides config).
    #[arg(long)]
    fps: Option<u32>,
    /// Output directory for the downloads (overrides config).
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.record_for == 0 {
        return Err(anyhow!("record-for must be >= 1"));
    }
    if args.record_after.saturating_add(args.record_for) > args.seconds {
        return Err(anyhow!(
            "recording window ({}s + {}s) does not fit in {}s",
            args.record_after,
            args.record_for,
            args.seconds
        ));
    }

    let mut config = AnnotatorConfig::load()?;
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        config.camera.target_fps = fps;
    }
    if let Some(out) = &args.out {
        config.recorder.output_dir = out.clone();
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(args.ui, is_tty, !stdout_is_tty);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run(&args, &config, &ui))?;

    match report {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => log::warn!("nothing was recorded"),
    }
    Ok(())
}

async fn run(args: &Args, config: &AnnotatorConfig, ui: &ui::Ui) -> Result<Option<ExportReport>> {
    let mut session = {
        let mut stage = ui.stage("Enable camera");
        let mut registry = DetectorRegistry::new();
        registry.register(StubBackend::new());
        let detector = registry.take(&config.detector)?;
        if detector.is_none() {
            log::warn!(
                "detector '{}' is not available (loaded: {:?})",
                config.detector,
                registry.list()
            );
        }

        let camera = SyntheticCamera::new(config.camera_config())?;
        let encoder = SyntheticEncoder::new(config.encoder_config())?;
        let sink = DirectorySink::new(&config.recorder.output_dir);
        log::info!("downloads go to {}", sink.dir().display());
        stage.finish_with(config.camera.url.clone());
        AnnotationSession::enable_camera(
            camera,
            detector,
            Box::new(encoder),
            Arc::new(sink),
            config.recorder_settings(),
        )
    };

    let stream = session.stream().clone();
    ctrlc::set_handler(move || {
        if stream.stop() {
            log::info!("interrupt received, disabling camera");
        }
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut active = session.stream().subscribe();
    let mut report = None;
    let mut interrupted = {
        let mut stage = ui.stage("Live view");
        let window = Duration::from_secs(args.record_after);
        !run_for(window, &session, &mut stage, &mut active).await
    };

    if !interrupted {
        let mut stage = ui.stage("Record");
        session.start_recording()?;
        let window = Duration::from_secs(args.record_for);
        interrupted = !run_for(window, &session, &mut stage, &mut active).await;
        if !interrupted {
            session.stop_recording();
            stage.show(live_status(&session));
            report = session.wait_recording_idle().await?;
        }
        stage.finish_with(format!("{} detections logged", session.logged_detections()));
    }
    if let Some(report) = &report {
        ui.saved(report, &config.recorder.output_dir);
    }

    if !interrupted {
        let rest = args.seconds - args.record_after - args.record_for;
        let mut stage = ui.stage("Live view");
        run_for(Duration::from_secs(rest), &session, &mut stage, &mut active).await;
    }

    let mut stage = ui.stage("Disable camera");
    let summary = session.disable_camera().await?;
    if let Some(detection) = &summary.detection {
        stage.finish_with(format!(
            "{} cycles, {} redraws ({:?})",
            detection.cycles, summary.redraws, detection.exit
        ));
    }
    drop(stage);
    if report.is_none() {
        if let Some(export) = &summary.export {
            ui.saved(export, &config.recorder.output_dir);
        }
    }
    Ok(report.or(summary.export))
}

fn live_status(session: &AnnotationSession) -> ui::LiveStatus {
    ui::LiveStatus::new(
        &session.overlay(),
        session.logged_detections(),
        session.recording_state(),
    )
}

/// Keep the session running while the stage line follows the overlay.
/// Returns false if the camera was disabled first.
async fn run_for(
    duration: Duration,
    session: &AnnotationSession,
    stage: &mut ui::StageGuard,
    active: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut refresh = tokio::time::interval(STATUS_REFRESH);
    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            _ = active.wait_for(|active| !*active) => return false,
            _ = refresh.tick() => stage.show(live_status(session)),
        }
    }
}
