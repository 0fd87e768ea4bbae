//! Progress reporting for scan operations
//!
//! Counters are published as [`ProgressUpdate`] values to any number of
//! subscribers, and optionally as JSON lines on stderr for an external
//! progress display.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ScanError;
use crate::models::ScanReport;

/// Scan phase indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    /// Walking directories and counting files
    #[default]
    Scan,
    /// Probing files for metadata
    Enrich,
    /// Scan completed
    Done,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Scan => "scan",
            ScanPhase::Enrich => "enrich",
            ScanPhase::Done => "done",
        }
    }
}

/// One observation of scan progress
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub phase: ScanPhase,
    /// Items finished in this phase
    pub processed: u64,
    /// Items expected in this phase; 0 while unknown
    pub total: u64,
    pub current_item: String,
}

/// Progress message written to stderr
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage<'a> {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    /// Milliseconds since reporter creation
    pub ts: u64,
    #[serde(flatten)]
    pub update: &'a ProgressUpdate,
}

/// Error message written to stderr
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Done message written to stderr
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    #[serde(rename = "tf")]
    pub total_files: u64,
    #[serde(rename = "td")]
    pub total_dirs: u64,
    #[serde(rename = "ef")]
    pub enriched_files: u64,
    #[serde(rename = "ec")]
    pub error_count: usize,
    pub ms: u64,
}

struct ThrottleState {
    last_report: Instant,
    /// `None` until the first update after creation or reset
    phase: Option<ScanPhase>,
    processed: u64,
}

/// Fans progress out to subscribers and stderr.
///
/// Updates are throttled to `interval`, and within a phase `processed`
/// never goes backwards even when workers report out of order.
pub struct ProgressReporter {
    stderr: bool,
    interval: Duration,
    state: Mutex<ThrottleState>,
    subscribers: Mutex<Vec<Sender<ProgressUpdate>>>,
    seq: AtomicU64,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(stderr: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            stderr,
            interval: Duration::from_millis(interval_ms),
            state: Mutex::new(ThrottleState {
                last_report: now,
                phase: None,
                processed: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            start_time: now,
        }
    }

    /// Reporter that only serves subscribers
    pub fn silent() -> Self {
        Self::new(false, 0)
    }

    /// Receive every published update from now on
    pub fn subscribe(&self) -> Receiver<ProgressUpdate> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Publish an update if the interval elapsed, or unconditionally when `force`
    pub fn report(&self, update: ProgressUpdate, force: bool) -> bool {
        // Held across publish so subscribers see updates in check order.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let new_phase = state.phase != Some(update.phase);
        if !new_phase && update.processed < state.processed {
            return false;
        }
        if !force && !new_phase && state.last_report.elapsed() < self.interval {
            return false;
        }
        state.phase = Some(update.phase);
        state.processed = update.processed;
        state.last_report = Instant::now();
        self.publish(update);
        true
    }

    /// Forget the previous scan; the next update starts a fresh sequence
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.phase = None;
        state.processed = 0;
        state.last_report = Instant::now();
    }

    fn publish(&self, update: ProgressUpdate) {
        if self.stderr {
            let msg = ProgressMessage {
                msg_type: "p",
                seq: self.next_seq(),
                ts: self.current_timestamp(),
                update: &update,
            };
            self.output_to_stderr(&msg);
        }
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Write an error line immediately
    pub fn report_error(&self, error: &ScanError) {
        if !self.stderr {
            return;
        }
        let msg = ErrorProgressMessage {
            msg_type: "err",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            error_type: format!("{:?}", error.kind),
            message: error.message.clone(),
            path: error.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        };
        self.output_to_stderr(&msg);
    }

    /// Publish the final update and the summary line
    pub fn report_done(&self, report: &ScanReport) {
        self.report(
            ProgressUpdate {
                phase: ScanPhase::Done,
                processed: report.total_files,
                total: report.total_files,
                current_item: String::new(),
            },
            true,
        );
        if !self.stderr {
            return;
        }
        let msg = DoneMessage {
            msg_type: "done",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            total_files: report.total_files,
            total_dirs: report.total_dirs,
            enriched_files: report.enriched_files,
            error_count: report.error_count(),
            ms: report.duration_ms,
        };
        self.output_to_stderr(&msg);
    }

    fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{}", json).ok();
            stderr.flush().ok();
        }
    }
}
