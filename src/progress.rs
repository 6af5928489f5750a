//! Machine-readable scan progress
//!
//! When enabled, the scanner writes one JSON object per line to stderr. Each
//! line has a `_t` tag (`start`, `p`, `err`, `done`), a `seq` that increases by
//! one per line and a `ts` in milliseconds since the reporter was created.
//! Periodic `p` lines are rate limited; the other kinds are written at once.

use serde::Serialize;
use std::cell::Cell;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::models::{ScanResult, ScanState};
use crate::scanner::ScanProgress;

/// Payload of one progress line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "_t")]
pub enum Event {
    #[serde(rename = "start")]
    Start {
        root: String,
        /// Exclusion patterns in effect
        exclusions: usize,
        batch_size: usize,
        threads: usize,
    },
    #[serde(rename = "p")]
    Progress {
        state: ScanState,
        #[serde(rename = "f")]
        found: u64,
        #[serde(rename = "d")]
        dirs: u64,
        #[serde(rename = "n")]
        new_files: u64,
        #[serde(rename = "s")]
        skipped: u64,
        #[serde(rename = "x")]
        failed: u64,
        dup: u64,
        dir: String,
        ms: u64,
    },
    #[serde(rename = "err")]
    Error {
        error_type: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    #[serde(rename = "done")]
    Done {
        state: ScanState,
        #[serde(rename = "tf")]
        found: u64,
        #[serde(rename = "td")]
        dirs: u64,
        #[serde(rename = "nf")]
        new_files: u64,
        #[serde(rename = "sf")]
        skipped: u64,
        #[serde(rename = "ff")]
        failed: u64,
        dup: u64,
        /// New rows without a thumbnail
        #[serde(rename = "mt")]
        missing_thumbnails: u64,
        #[serde(rename = "ec")]
        errors: u64,
        ms: u64,
    },
}

impl From<&ScanProgress> for Event {
    fn from(p: &ScanProgress) -> Self {
        Event::Progress {
            state: p.state,
            found: p.found_files,
            dirs: p.scanned_dirs,
            new_files: p.new_files,
            skipped: p.skipped_files,
            failed: p.failed_files,
            dup: p.duplicates,
            dir: p.current_dir.clone(),
            ms: p.elapsed_ms,
        }
    }
}

impl From<&ScanError> for Event {
    fn from(e: &ScanError) -> Self {
        Event::Error {
            error_type: format!("{:?}", e.kind),
            message: e.message.clone(),
            path: e.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

impl From<&ScanResult> for Event {
    fn from(r: &ScanResult) -> Self {
        Event::Done {
            state: r.state,
            found: r.found_files,
            dirs: r.total_dirs,
            new_files: r.new_files,
            skipped: r.skipped_files,
            failed: r.failed_files,
            dup: r.duplicates,
            missing_thumbnails: r.missing_thumbnails,
            errors: r.error_count(),
            ms: r.duration_ms,
        }
    }
}

/// One serialized line: sequence header plus the flattened event
#[derive(Debug, Serialize)]
struct Line<'a> {
    seq: u64,
    ts: u64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Writes progress lines for one scan
///
/// Lives on the thread driving the traversal; not shared with workers.
pub struct ProgressReporter {
    enabled: bool,
    interval: Duration,
    last_progress: Cell<Instant>,
    seq: Cell<u64>,
    created: Instant,
}

impl ProgressReporter {
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            interval: Duration::from_millis(interval_ms),
            last_progress: Cell::new(now),
            seq: Cell::new(0),
            created: now,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.show_progress, config.progress_interval_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a `p` line is due
    pub fn should_report(&self) -> bool {
        self.enabled && self.last_progress.get().elapsed() >= self.interval
    }

    pub fn report_start(&self, root: &Path, config: &ScanConfig, exclusions: usize) {
        self.emit(&Event::Start {
            root: root.to_string_lossy().into_owned(),
            exclusions,
            batch_size: config.effective_batch_size(),
            threads: config.effective_threads(),
        });
    }

    /// Write a `p` line if one is due; returns whether it was written
    pub fn report_progress(&self, progress: &ScanProgress) -> bool {
        if !self.should_report() {
            return false;
        }
        self.emit(&Event::from(progress));
        self.last_progress.set(Instant::now());
        true
    }

    pub fn report_error(&self, error: &ScanError) {
        self.emit(&Event::from(error));
    }

    pub fn report_done(&self, result: &ScanResult) {
        self.emit(&Event::from(result));
    }

    fn emit(&self, event: &Event) {
        if let Some(line) = self.render(event) {
            let mut stderr = std::io::stderr().lock();
            // A closed stderr must not fail the scan.
            let _ = writeln!(stderr, "{}", line).and_then(|_| stderr.flush());
        }
    }

    /// Serialize `event` with the next sequence number; `None` when disabled
    fn render(&self, event: &Event) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let seq = self.seq.get();
        let line = Line {
            seq,
            ts: self.created.elapsed().as_millis() as u64,
            event,
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                self.seq.set(seq + 1);
                Some(json)
            }
            Err(e) => {
                log::debug!("Unserializable progress event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanErrorKind;
    use serde_json::Value;
    use std::path::PathBuf;

    fn parse(line: Option<String>) -> Value {
        serde_json::from_str(&line.expect("reporter enabled")).unwrap()
    }

    #[test]
    fn start_line_carries_scan_parameters() {
        let reporter = ProgressReporter::new(true, 0);
        let config = ScanConfig::builder().batch_size(16).num_threads(3).build();
        let line = parse(reporter.render(&Event::Start {
            root: "/photos".into(),
            exclusions: 12,
            batch_size: config.effective_batch_size(),
            threads: config.effective_threads(),
        }));

        assert_eq!(line["_t"], "start");
        assert_eq!(line["seq"], 0);
        assert_eq!(line["root"], "/photos");
        assert_eq!(line["exclusions"], 12);
        assert_eq!(line["batch_size"], 16);
        assert_eq!(line["threads"], 3);
    }

    #[test]
    fn progress_line_uses_short_keys() {
        let reporter = ProgressReporter::new(true, 0);
        let snapshot = ScanProgress {
            state: ScanState::Processing,
            found_files: 100,
            scanned_dirs: 10,
            new_files: 60,
            skipped_files: 30,
            failed_files: 2,
            duplicates: 5,
            current_dir: "/photos/2023".to_string(),
            elapsed_ms: 1500,
        };
        let line = parse(reporter.render(&Event::from(&snapshot)));

        assert_eq!(line["_t"], "p");
        assert_eq!(line["state"], "processing");
        assert_eq!(
            (&line["f"], &line["d"], &line["n"], &line["s"], &line["x"], &line["dup"]),
            (&Value::from(100), &Value::from(10), &Value::from(60), &Value::from(30), &Value::from(2), &Value::from(5))
        );
        assert_eq!(line["dir"], "/photos/2023");
        assert_eq!(line["ms"], 1500);
    }

    #[test]
    fn error_line_omits_missing_path() {
        let reporter = ProgressReporter::new(true, 0);

        let with_path = ScanError::new(
            ScanErrorKind::PermissionDenied,
            Some(PathBuf::from("/photos/locked.jpg")),
            "permission denied",
        );
        let line = parse(reporter.render(&Event::from(&with_path)));
        assert_eq!(line["_t"], "err");
        assert_eq!(line["error_type"], "PermissionDenied");
        assert_eq!(line["path"], "/photos/locked.jpg");

        let without = ScanError::database_error("disk full");
        let line = reporter.render(&Event::from(&without)).unwrap();
        assert!(!line.contains("\"path\""));
    }

    #[test]
    fn done_line_summarizes_result() {
        let reporter = ProgressReporter::new(true, 0);
        let mut result = ScanResult::new(PathBuf::from("/photos"));
        result.state = ScanState::Stopped;
        result.found_files = 1000;
        result.new_files = 500;
        result.skipped_files = 490;
        result.failed_files = 10;
        result.duplicates = 7;
        result.missing_thumbnails = 3;
        result.duration_ms = 4500;
        result.record_error(ScanError::new(ScanErrorKind::Read, None, "short read"));

        let line = parse(reporter.render(&Event::from(&result)));
        assert_eq!(line["_t"], "done");
        assert_eq!(line["state"], "stopped");
        assert_eq!(line["tf"], 1000);
        assert_eq!(line["nf"], 500);
        assert_eq!(line["sf"], 490);
        assert_eq!(line["ff"], 10);
        assert_eq!(line["mt"], 3);
        assert_eq!(line["ec"], 1);
    }

    #[test]
    fn sequence_increases_per_line() {
        let reporter = ProgressReporter::new(true, 0);
        let event = Event::from(&ScanResult::default());
        let seqs: Vec<Value> = (0..3)
            .map(|_| parse(reporter.render(&event))["seq"].clone())
            .collect();
        assert_eq!(seqs, vec![Value::from(0), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn progress_is_rate_limited() {
        let reporter = ProgressReporter::new(true, 10);
        assert!(!reporter.should_report());

        std::thread::sleep(Duration::from_millis(20));
        assert!(reporter.should_report());
        assert!(reporter.report_progress(&ScanProgress::default()));
        assert!(!reporter.should_report());
    }

    #[test]
    fn disabled_reporter_writes_nothing() {
        let reporter = ProgressReporter::new(false, 0);
        assert!(!reporter.is_enabled());
        assert!(!reporter.should_report());
        assert!(!reporter.report_progress(&ScanProgress::default()));
        assert!(reporter.render(&Event::from(&ScanResult::default())).is_none());

        reporter.report_start(Path::new("/photos"), &ScanConfig::default(), 3);
        assert_eq!(reporter.seq.get(), 0);
    }

    #[test]
    fn from_config_reads_interval() {
        let config = ScanConfig::builder()
            .show_progress(true)
            .progress_interval_ms(50)
            .build();
        let reporter = ProgressReporter::from_config(&config);
        assert!(reporter.is_enabled());
        assert_eq!(reporter.interval, Duration::from_millis(50));
    }
}
