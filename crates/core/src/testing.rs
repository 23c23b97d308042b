use crate::log::{LogView, ScrollPosition};
use crate::presenter::Presenter;
use crate::progress::ReconciledState;
use crate::source::StatusSource;
use migration_monitor_api_client::{StartAck, TransportError};
use migration_monitor_api_types::{
    LogEntry, LogType, MigrationStats, PhaseStats, RawStatusPayload, StartStatus,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type Scripted<T> = Result<T, TransportError>;

/// Payload with both counters set; tuples are `(total, completed)`.
pub fn payload(status: &str, groups: (u64, u64), projects: (u64, u64)) -> RawStatusPayload {
    RawStatusPayload {
        status: status.to_string(),
        stats: Some(MigrationStats {
            groups: Some(PhaseStats::new(groups.0, groups.1)),
            projects: Some(PhaseStats::new(projects.0, projects.1)),
        }),
        ..RawStatusPayload::default()
    }
}

/// Payload carrying the first `n` entries of a fixed log.
pub fn payload_with_logs(status: &str, n: usize) -> RawStatusPayload {
    RawStatusPayload {
        logs: (0..n).map(log_entry).collect(),
        ..RawStatusPayload::with_status(status)
    }
}

/// Entry `i` of the fixed log used by [`payload_with_logs`].
pub fn log_entry(i: usize) -> LogEntry {
    let log_type = if i % 5 == 4 {
        LogType::Warning
    } else {
        LogType::Info
    };
    LogEntry::new(log_type, format!("12:00:{:02}", i % 60), format!("step {i}"))
}

/// Shared call count, readable after the source moved into a controller.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// [`StatusSource`] replaying canned responses.
///
/// Status responses are consumed in order; the last one repeats forever.
/// Start requests succeed unless overridden with [`ScriptedSource::with_start`].
#[derive(Debug)]
pub struct ScriptedSource {
    statuses: Mutex<VecDeque<Scripted<RawStatusPayload>>>,
    start: Scripted<StartAck>,
    gate: Option<Arc<Notify>>,
    fetches: CallCounter,
    starts: CallCounter,
}

impl ScriptedSource {
    pub fn new(statuses: Vec<Scripted<RawStatusPayload>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            start: Ok(StartAck {
                status: StartStatus::Success,
                message: "Migration started.".to_string(),
            }),
            gate: None,
            fetches: CallCounter::default(),
            starts: CallCounter::default(),
        }
    }

    pub fn with_start(mut self, start: Scripted<StartAck>) -> Self {
        self.start = start;
        self
    }

    /// Hold every status response until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fetch_counter(&self) -> CallCounter {
        self.fetches.clone()
    }

    pub fn start_counter(&self) -> CallCounter {
        self.starts.clone()
    }

    fn next_status(&self) -> Scripted<RawStatusPayload> {
        let mut queue = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or_else(|| Err(TransportError::Request("no scripted status".to_string())))
    }
}

impl StatusSource for ScriptedSource {
    fn request_start(&self) -> impl Future<Output = Result<StartAck, TransportError>> + Send {
        self.starts.bump();
        let start = self.start.clone();
        async move { start }
    }

    fn fetch_status(
        &self,
    ) -> impl Future<Output = Result<RawStatusPayload, TransportError>> + Send {
        self.fetches.bump();
        let next = self.next_status();
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            next
        }
    }
}

/// One call to [`Presenter::render`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub state: ReconciledState,
    pub log_total: usize,
    pub new_entries: usize,
    pub should_auto_scroll: bool,
}

/// Presenter that records every frame.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub frames: Vec<Frame>,
    pub activity_ticks: usize,
    pub position: Option<ScrollPosition>,
}

impl RecordingPresenter {
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, state: &ReconciledState, log: &LogView<'_>) {
        self.frames.push(Frame {
            state: state.clone(),
            log_total: log.total(),
            new_entries: log.new_entries().len(),
            should_auto_scroll: log.should_auto_scroll,
        });
    }

    fn render_activity_tick(&mut self) {
        self.activity_ticks += 1;
    }

    fn scroll_position(&self) -> Option<ScrollPosition> {
        self.position
    }
}
