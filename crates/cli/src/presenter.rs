use std::io::Write;

use migration_monitor_api_types::{LogEntry, LogType};
use migration_monitor_core::progress::phase_percent;
use migration_monitor_core::{LogDelta, LogView, MigrationPhase, Presenter, ReconciledState};
use tracing::warn;

/// Line-oriented presenter for a terminal.
///
/// Prints the status block only when it changes and only the log entries the
/// previous render did not show, so the output reads as an append-only
/// transcript. After the first write error (a closed pipe, typically) all
/// further output is dropped.
pub struct TerminalPresenter<W> {
    out: W,
    last_status: Option<String>,
    printed_entries: usize,
    broken: bool,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_status: None,
            printed_entries: 0,
            broken: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Whether output stopped after a write error.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn write_line(&mut self, line: &str) {
        if self.broken {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            warn!("Terminal output failed, dropping further output: {e}");
            self.broken = true;
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render(&mut self, state: &ReconciledState, log: &LogView<'_>) {
        let status = status_block(state);
        if self.last_status.as_deref() != Some(status.as_str()) {
            self.write_line(&status);
            self.last_status = Some(status);
        }

        if log.delta == LogDelta::Replaced && self.printed_entries > 0 {
            self.write_line(&format!("-- log restarted ({} entries) --", log.total()));
        }
        for entry in log.new_entries() {
            self.write_line(&format_entry(entry));
        }
        if log.delta != LogDelta::Unchanged {
            self.printed_entries = log.total();
        }

        if !self.broken && self.out.flush().is_err() {
            warn!("Terminal output failed, dropping further output");
            self.broken = true;
        }
    }
}

fn status_block(state: &ReconciledState) -> String {
    let gauge = if state.show_progress() {
        format!("{:>3}%", state.overall_percent)
    } else {
        "----".to_string()
    };
    let mut lines = vec![format!(
        "[{gauge}] {}: {}",
        state.phase.label(),
        state.display_message
    )];

    if state.phase.is_active() {
        lines.push(format!("       {}", state.activity()));
    }
    for (phase, stats) in &state.per_phase {
        let name = match phase {
            MigrationPhase::MigratingGroups => "groups",
            MigrationPhase::MigratingProjects => "projects",
            _ => continue,
        };
        lines.push(format!(
            "       {name:<8} {}/{} ({}%)",
            stats.completed,
            stats.total,
            phase_percent(stats)
        ));
    }
    if let Some(err) = &state.error_message {
        if err != &state.display_message {
            lines.push(format!("       error: {err}"));
        }
    }

    lines.join("\n")
}

fn format_entry(entry: &LogEntry) -> String {
    let level = match entry.log_type {
        LogType::Info => "INFO",
        LogType::Warning => "WARN",
        LogType::Error => "ERROR",
    };
    format!("{} {level:<5} {}", entry.timestamp, entry.message)
}
