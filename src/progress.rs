use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;

/// Line-delimited event for GUI front-ends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress { message: String, percentage: f64 },
    Log { message: String },
}

/// Where batch progress goes
pub enum Progress {
    Bar(ProgressBar),
    Json,
    Silent,
}

impl Progress {
    pub fn bar() -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Progress::Bar(pb)
    }

    pub fn json() -> Self {
        Progress::Json
    }

    pub fn silent() -> Self {
        Progress::Silent
    }

    /// Report a pipeline milestone
    pub fn stage(&self, message: &str, percentage: f64) {
        match self {
            Progress::Bar(pb) => {
                pb.set_position(percentage.clamp(0.0, 100.0) as u64);
                pb.set_message(message.to_string());
            }
            Progress::Json => emit(&ProgressEvent::Progress {
                message: message.to_string(),
                percentage,
            }),
            Progress::Silent => {}
        }
    }

    /// Report a per-file event
    pub fn log(&self, message: &str) {
        match self {
            Progress::Json => emit(&ProgressEvent::Log {
                message: message.to_string(),
            }),
            Progress::Bar(_) | Progress::Silent => {}
        }
    }

    pub fn finish(&self, message: &str) {
        match self {
            Progress::Bar(pb) => pb.finish_with_message(message.to_string()),
            _ => self.stage(message, 100.0),
        }
    }
}

/// Percentage for pair `index` of `total`, within the 40-90% band
pub fn pair_percentage(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 90.0;
    }
    40.0 + (index as f64 / total as f64) * 50.0
}

fn emit(event: &ProgressEvent) {
    if let Ok(line) = serde_json::to_string(event) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let progress = serde_json::to_value(ProgressEvent::Progress {
            message: "Extracting metadata...".to_string(),
            percentage: 10.0,
        })
        .unwrap();
        assert_eq!(
            progress,
            serde_json::json!({"type": "progress", "message": "Extracting metadata...", "percentage": 10.0})
        );

        let log = serde_json::to_value(ProgressEvent::Log {
            message: "Moved IMG_1.MOV".to_string(),
        })
        .unwrap();
        assert_eq!(log, serde_json::json!({"type": "log", "message": "Moved IMG_1.MOV"}));
    }

    #[test]
    fn test_pair_percentage_band() {
        assert_eq!(pair_percentage(0, 4), 40.0);
        assert_eq!(pair_percentage(2, 4), 65.0);
        assert_eq!(pair_percentage(4, 4), 90.0);
        assert_eq!(pair_percentage(0, 0), 90.0);
    }
}
