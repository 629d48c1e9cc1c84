use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use live_annotate::{ExportReport, OverlayElement, OverlayFrame, RecordingState};

/// How stage progress is shown on stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Snapshot of what the viewer currently sees.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveStatus {
    /// Captions drawn in the current overlay frame.
    pub labels: Vec<String>,
    pub logged: usize,
    pub recording: RecordingState,
}

impl LiveStatus {
    pub fn new(overlay: &OverlayFrame, logged: usize, recording: RecordingState) -> Self {
        let labels = overlay
            .elements
            .iter()
            .filter_map(|element| match element {
                OverlayElement::Label { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        Self {
            labels,
            logged,
            recording,
        }
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            write!(f, "nothing on screen")?;
        } else {
            write!(f, "{}", self.labels.join(", "))?;
        }
        write!(f, " | {} logged", self.logged)?;
        match self.recording {
            RecordingState::Idle => Ok(()),
            RecordingState::Recording => write!(f, " | REC"),
            RecordingState::Stopping => write!(f, " | saving"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    /// Start a camera stage. It is reported finished when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} [{elapsed}] {prefix}: {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_prefix(name.to_string());
            spinner.set_message("starting");
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            last_status: None,
            outcome: None,
        }
    }

    /// One line naming the downloads written for a recording.
    pub fn saved(&self, report: &ExportReport, dir: &Path) {
        eprintln!("{}", saved_line(report, dir));
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    last_status: Option<LiveStatus>,
    outcome: Option<String>,
}

impl StageGuard {
    /// Refresh the live line. Plain output only reports the last status at the end.
    pub fn show(&mut self, status: LiveStatus) {
        if self.last_status.as_ref() == Some(&status) {
            return;
        }
        if let Some(spinner) = &self.spinner {
            spinner.set_message(status.to_string());
        }
        self.last_status = Some(status);
    }

    /// Detail shown after the stage name when it finishes.
    pub fn finish_with(&mut self, outcome: impl Into<String>) {
        self.outcome = Some(outcome.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let detail = self
            .outcome
            .clone()
            .or_else(|| self.last_status.as_ref().map(ToString::to_string));
        let message = match detail {
            Some(detail) => format!("✔ {}: {} ({})", self.name, detail, elapsed),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn saved_line(report: &ExportReport, dir: &Path) -> String {
    if report.empty {
        return format!("nothing to save in {}", dir.display());
    }
    let mut files = Vec::new();
    if report.video_delivered {
        files.push(format!(
            "video ({} segments, {} annotated, {} bytes)",
            report.segments, report.annotated_segments, report.video_bytes
        ));
    }
    if report.manifest_delivered {
        files.push(format!("manifest ({} entries)", report.manifest_entries));
    }
    if files.is_empty() {
        return format!("no downloads reached {}", dir.display());
    }
    format!("saved {} to {}", files.join(" and "), dir.display())
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
