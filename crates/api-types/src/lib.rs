//! Wire types for the migration server HTTP contract.
//!
//! The server is the single source of truth for migration state. These types
//! mirror what `POST /start-migration` and `GET /get-status` return and are
//! deliberately lenient: every field has a default so a partial payload still
//! decodes, and `status` stays a plain string until the core maps it to a
//! phase. TypeScript types are generated via `ts-rs` for web presenters.
//!
//! To regenerate TypeScript types:
//!   cargo test -p migration-monitor-api-types -- export_typescript --nocapture

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ─── Start ───────────────────────────────────────────────────────────────────

/// Outcome reported by `POST /start-migration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StartStatus {
    /// A fresh migration was launched.
    Success,
    /// A migration was already running; the server did not start another.
    Warning,
    /// The server refused to start.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StartResponse {
    pub status: StartStatus,
    #[serde(default)]
    pub message: String,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Counters for one phase of the migration (groups or projects).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PhaseStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    /// Name of the group/project currently being processed. The server sends
    /// an empty string between items.
    #[serde(default)]
    pub current_item_name: Option<String>,
}

impl PhaseStats {
    pub fn new(total: u64, completed: u64) -> Self {
        Self {
            total,
            completed,
            current_item_name: None,
        }
    }

    /// The current item, treating an empty name as absent.
    pub fn current_item(&self) -> Option<&str> {
        self.current_item_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MigrationStats {
    #[serde(default)]
    pub groups: Option<PhaseStats>,
    #[serde(default)]
    pub projects: Option<PhaseStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum LogType {
    Info,
    Warning,
    Error,
}

/// One server-side log line. Entries are immutable once the server emits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    #[serde(default)]
    pub message: String,
}

impl LogEntry {
    pub fn new(log_type: LogType, timestamp: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            log_type,
            message: message.into(),
        }
    }
}

/// Body of `GET /get-status`. The log is a full snapshot, not a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RawStatusPayload {
    /// One of `idle`, `initializing`, `running`, `migrating_groups`,
    /// `migrating_projects`, `completed`, `error`. Anything else is treated
    /// as `idle` by the client.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_action: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stats: Option<MigrationStats>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl RawStatusPayload {
    /// Payload with only a status set, as the server sends before stats exist.
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn groups(&self) -> Option<&PhaseStats> {
        self.stats.as_ref().and_then(|s| s.groups.as_ref())
    }

    pub fn projects(&self) -> Option<&PhaseStats> {
        self.stats.as_ref().and_then(|s| s.projects.as_ref())
    }
}

// ─── TypeScript generation ───────────────────────────────────────────────────
