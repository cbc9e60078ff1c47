//! Ingestion progress rendering for the CLI.
//!
//! Renders every accepted [`ProgressSnapshot`] on **stderr** so stdout
//! stays parseable for scripts (`pagewise ingest … | jq`).

use std::io::Write;
use std::str::FromStr;

use pagewise_core::progress::{ProgressObserver, ProgressSnapshot};

/// Human-friendly progress: `ingest 3f2a…  analyzing   40%  Analyzed 5 of 5 pages  ~12s left`.
pub struct StderrProgress;

impl ProgressObserver for StderrProgress {
    fn observe(&self, document_id: &str, snapshot: &ProgressSnapshot) {
        let mut line = format!(
            "ingest {}  {:<9} {:>3}%  {}",
            short_id(document_id),
            snapshot.stage.as_str(),
            snapshot.progress,
            snapshot.message
        );
        match snapshot.estimated_remaining_seconds {
            Some(secs) if secs > 0 => line.push_str(&format!("  ~{} left", format_duration(secs))),
            _ => {}
        }
        line.push('\n');
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressObserver for JsonProgress {
    fn observe(&self, document_id: &str, snapshot: &ProgressSnapshot) {
        let obj = serde_json::json!({
            "event": "progress",
            "documentId": document_id,
            "stage": snapshot.stage,
            "progress": snapshot.progress,
            "elapsedSeconds": snapshot.elapsed_seconds,
            "estimatedRemainingSeconds": snapshot.estimated_remaining_seconds,
            "message": snapshot.message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((byte, _)) => &id[..byte],
        None => id,
    }
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Explicit choice if given, otherwise [`default_for_tty`](Self::default_for_tty).
    pub fn resolve(choice: Option<&str>) -> anyhow::Result<Self> {
        match choice {
            Some(value) => value.parse(),
            None => Ok(Self::default_for_tty()),
        }
    }

    /// Observer for this mode, or `None` when progress is off.
    pub fn observer(&self) -> Option<Box<dyn ProgressObserver>> {
        match self {
            ProgressMode::Off => None,
            ProgressMode::Human => Some(Box::new(StderrProgress)),
            ProgressMode::Json => Some(Box::new(JsonProgress)),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "invalid progress mode '{}': expected off, human, or json",
                other
            ),
        }
    }
}
