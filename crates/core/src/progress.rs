//! Pure reconciliation of a raw status payload into display-ready state.
//!
//! [`reconcile`] derives everything from the payload it is given and holds no
//! state between calls, so applying the same payload twice yields the same
//! [`ReconciledState`].
//!
//! Overall progress splits the bar in two weighted halves:
//!
//! | phase                | percent                                   |
//! |----------------------|-------------------------------------------|
//! | `migrating_groups`   | `round(done / max(1, total) * 50)`        |
//! | `migrating_projects` | `50 + round(done / max(1, total) * 50)`   |
//! | `completed`          | `100`                                     |
//! | `initializing`/`running` | [`ACTIVITY_PERCENT`]                  |
//! | `idle`/`error`       | `0`                                       |

use std::collections::BTreeMap;

use migration_monitor_api_client::TransportError;
use migration_monitor_api_types::{PhaseStats, RawStatusPayload};
use serde::Serialize;

use crate::phase::MigrationPhase;

/// Sliver shown while the server is busy but has not reported counts yet.
pub const ACTIVITY_PERCENT: u8 = 1;

/// Share of the overall bar given to each of the two counted phases.
const PHASE_WEIGHT: u64 = 50;

/// Normalized client view of one status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledState {
    pub phase: MigrationPhase,
    /// Always within `0..=100`.
    pub overall_percent: u8,
    /// Counters keyed by the phase they belong to (`migrating_groups`,
    /// `migrating_projects`). Only phases the server reported are present.
    pub per_phase: BTreeMap<MigrationPhase, PhaseStats>,
    pub is_terminal: bool,
    pub is_error: bool,
    pub display_message: String,
    pub error_message: Option<String>,
}

/// Derive the client state for one payload.
pub fn reconcile(payload: &RawStatusPayload) -> ReconciledState {
    let phase = MigrationPhase::parse(&payload.status);

    let mut per_phase = BTreeMap::new();
    if let Some(groups) = payload.groups() {
        per_phase.insert(MigrationPhase::MigratingGroups, groups.clone());
    }
    if let Some(projects) = payload.projects() {
        per_phase.insert(MigrationPhase::MigratingProjects, projects.clone());
    }

    let overall_percent = overall_percent(phase, payload.groups(), payload.projects());
    let error_message = non_empty(payload.error_message.as_deref()).map(str::to_string);
    let display_message = match (phase, &error_message) {
        (MigrationPhase::Error, Some(msg)) => msg.clone(),
        _ => non_empty(payload.current_action.as_deref())
            .unwrap_or(phase.default_message())
            .to_string(),
    };

    ReconciledState {
        phase,
        overall_percent,
        per_phase,
        is_terminal: phase.is_terminal(),
        is_error: phase == MigrationPhase::Error,
        display_message,
        error_message,
    }
}

/// Overall percentage for a phase given the reported counters.
pub fn overall_percent(
    phase: MigrationPhase,
    groups: Option<&PhaseStats>,
    projects: Option<&PhaseStats>,
) -> u8 {
    let empty = PhaseStats::default();
    let percent = match phase {
        MigrationPhase::MigratingGroups => {
            let g = groups.unwrap_or(&empty);
            // Not plain round(fraction * 50): unfinished groups stop at 49,
            // so 199/200 reads 49 and never looks like the phase is done.
            weighted(g.completed, g.total, PHASE_WEIGHT)
        }
        MigrationPhase::MigratingProjects => {
            let p = projects.unwrap_or(&empty);
            PHASE_WEIGHT + weighted(p.completed, p.total, PHASE_WEIGHT)
        }
        MigrationPhase::Completed => 100,
        MigrationPhase::Initializing | MigrationPhase::Running => u64::from(ACTIVITY_PERCENT),
        MigrationPhase::Idle | MigrationPhase::Error => 0,
    };
    percent.min(100) as u8
}

/// Percentage for a single phase card, on a 0–100 scale.
pub fn phase_percent(stats: &PhaseStats) -> u8 {
    weighted(stats.completed, stats.total, 100).min(100) as u8
}

/// `round(completed / max(1, total) * scale)`, clamped to `0..=scale`.
///
/// Only a finished phase reaches `scale`: rounding up an unfinished one stops
/// one short.
fn weighted(completed: u64, total: u64, scale: u64) -> u64 {
    let denom = u128::from(total.max(1));
    let done = u128::from(completed).min(denom);
    let scale = u128::from(scale);
    // Half-up rounding in integer arithmetic.
    let rounded = (done * scale * 2 + denom) / (denom * 2);
    let capped = if done < denom {
        rounded.min(scale.saturating_sub(1))
    } else {
        rounded
    };
    capped as u64
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl ReconciledState {
    /// State shown while a start request is in flight.
    pub fn pending_start() -> Self {
        Self::client_side(
            MigrationPhase::Initializing,
            "Sending start request to server...",
            None,
        )
    }

    /// The start request never reached a usable answer.
    pub fn start_failed(err: &TransportError) -> Self {
        Self::client_side(
            MigrationPhase::Error,
            "Error communicating with server.",
            Some(err.to_string()),
        )
    }

    /// The server answered the start request with `status: "error"`.
    pub fn start_rejected(message: &str) -> Self {
        let message = non_empty(Some(message)).unwrap_or("Failed to start migration on server");
        Self::client_side(MigrationPhase::Error, message, Some(message.to_string()))
    }

    /// A poll tick could not fetch status.
    pub fn fetch_failed(err: &TransportError) -> Self {
        Self::client_side(
            MigrationPhase::Error,
            "Error fetching status from server.",
            Some(err.to_string()),
        )
    }

    /// The very first status check failed.
    pub fn unreachable(err: &TransportError) -> Self {
        Self::client_side(
            MigrationPhase::Error,
            "Could not connect to backend.",
            Some(err.to_string()),
        )
    }

    fn client_side(phase: MigrationPhase, message: &str, error_message: Option<String>) -> Self {
        Self {
            phase,
            overall_percent: overall_percent(phase, None, None),
            per_phase: BTreeMap::new(),
            is_terminal: phase.is_terminal(),
            is_error: phase == MigrationPhase::Error,
            display_message: message.to_string(),
            error_message,
        }
    }

    pub fn groups(&self) -> Option<&PhaseStats> {
        self.per_phase.get(&MigrationPhase::MigratingGroups)
    }

    pub fn projects(&self) -> Option<&PhaseStats> {
        self.per_phase.get(&MigrationPhase::MigratingProjects)
    }

    /// Whether a progress bar makes sense for this phase.
    pub fn show_progress(&self) -> bool {
        !matches!(self.phase, MigrationPhase::Idle | MigrationPhase::Error)
    }

    /// One-line description of what the server is working on right now.
    pub fn activity(&self) -> String {
        match self.phase {
            MigrationPhase::MigratingGroups => format!(
                "Group: {}",
                self.groups()
                    .and_then(PhaseStats::current_item)
                    .unwrap_or("Scanning...")
            ),
            MigrationPhase::MigratingProjects => format!(
                "Project: {}",
                self.projects()
                    .and_then(PhaseStats::current_item)
                    .unwrap_or("Scanning...")
            ),
            MigrationPhase::Initializing | MigrationPhase::Running => {
                self.display_message.clone()
            }
            MigrationPhase::Idle => "Idle. Ready to start.".to_string(),
            MigrationPhase::Completed => "Migration Completed!".to_string(),
            MigrationPhase::Error => "Error Occurred!".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration_monitor_api_types::MigrationStats;

    fn payload(status: &str, groups: (u64, u64), projects: (u64, u64)) -> RawStatusPayload {
        RawStatusPayload {
            status: status.to_string(),
            stats: Some(MigrationStats {
                groups: Some(PhaseStats::new(groups.0, groups.1)),
                projects: Some(PhaseStats::new(projects.0, projects.1)),
            }),
            ..RawStatusPayload::default()
        }
    }

    #[test]
    fn groups_halfway_is_quarter_overall() {
        let state = reconcile(&payload("migrating_groups", (10, 5), (0, 0)));
        assert_eq!(state.phase, MigrationPhase::MigratingGroups);
        assert_eq!(state.overall_percent, 25);
        assert!(!state.is_terminal);
    }

    #[test]
    fn projects_all_done_is_full() {
        let state = reconcile(&payload("migrating_projects", (10, 10), (4, 4)));
        assert_eq!(state.overall_percent, 100);
    }

    #[test]
    fn completed_without_stats_is_full_and_terminal() {
        let state = reconcile(&RawStatusPayload::with_status("completed"));
        assert_eq!(state.overall_percent, 100);
        assert!(state.is_terminal);
        assert!(!state.is_error);
        assert_eq!(state.display_message, "All tasks finished successfully.");
    }

    #[test]
    fn zero_totals_never_divide_by_zero() {
        assert_eq!(weighted(0, 0, 50), 0);
        assert_eq!(phase_percent(&PhaseStats::new(0, 0)), 0);
        let state = reconcile(&payload("migrating_groups", (0, 0), (0, 0)));
        assert_eq!(state.overall_percent, 0);
        let state = reconcile(&payload("migrating_projects", (0, 0), (0, 0)));
        assert_eq!(state.overall_percent, 50);
    }

    #[test]
    fn missing_stats_in_counted_phase_falls_back() {
        let groups = reconcile(&RawStatusPayload::with_status("migrating_groups"));
        assert_eq!(groups.overall_percent, 0);
        assert!(groups.per_phase.is_empty());
        let projects = reconcile(&RawStatusPayload::with_status("migrating_projects"));
        assert_eq!(projects.overall_percent, 50);
    }

    #[test]
    fn completed_beyond_total_is_clamped() {
        let state = reconcile(&payload("migrating_groups", (3, 9), (0, 0)));
        assert_eq!(state.overall_percent, 50);
        let state = reconcile(&payload("migrating_projects", (3, 3), (2, 7)));
        assert_eq!(state.overall_percent, 100);
    }

    #[test]
    fn groups_percent_is_bounded_and_monotonic() {
        for total in 1..=120u64 {
            let mut prev = 0;
            for completed in 0..=total {
                let p = overall_percent(
                    MigrationPhase::MigratingGroups,
                    Some(&PhaseStats::new(total, completed)),
                    None,
                );
                assert!(p <= 50, "total={total} completed={completed} p={p}");
                assert!(p >= prev, "total={total} completed={completed}");
                prev = p;
            }
        }
    }

    #[test]
    fn unfinished_groups_stay_below_half() {
        let at = |completed| {
            overall_percent(
                MigrationPhase::MigratingGroups,
                Some(&PhaseStats::new(200, completed)),
                None,
            )
        };
        assert_eq!(at(199), 49);
        assert_eq!(at(200), 50);
        assert_eq!(at(100), 25);
    }

    #[test]
    fn projects_percent_reaches_100_only_when_done() {
        for total in 1..=250u64 {
            for completed in 0..=total {
                let p = overall_percent(
                    MigrationPhase::MigratingProjects,
                    None,
                    Some(&PhaseStats::new(total, completed)),
                );
                assert!(p >= 50, "total={total} completed={completed}");
                assert_eq!(p == 100, completed == total, "total={total} completed={completed}");
            }
        }
    }

    #[test]
    fn busy_phases_show_activity_sliver() {
        for status in ["initializing", "running"] {
            let state = reconcile(&RawStatusPayload::with_status(status));
            assert_eq!(state.overall_percent, ACTIVITY_PERCENT);
            assert!(state.show_progress());
        }
        for status in ["idle", "error", "bogus"] {
            let state = reconcile(&RawStatusPayload::with_status(status));
            assert_eq!(state.overall_percent, 0);
            assert!(!state.show_progress());
        }
    }

    #[test]
    fn error_message_wins_only_in_error_phase() {
        let mut p = RawStatusPayload::with_status("error");
        p.current_action = Some("Pushing repo".into());
        p.error_message = Some("auth failed".into());
        let state = reconcile(&p);
        assert!(state.is_error && state.is_terminal);
        assert_eq!(state.display_message, "auth failed");

        p.status = "running".into();
        let state = reconcile(&p);
        assert_eq!(state.display_message, "Pushing repo");

        p.current_action = Some("   ".into());
        let state = reconcile(&p);
        assert_eq!(state.display_message, MigrationPhase::Running.default_message());
    }

    #[test]
    fn error_without_message_uses_default() {
        let state = reconcile(&RawStatusPayload::with_status("error"));
        assert_eq!(state.error_message, None);
        assert_eq!(
            state.display_message,
            "An unspecified error occurred during migration."
        );
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut p = payload("migrating_projects", (12, 12), (40, 17));
        p.current_action = Some("Cloning".into());
        assert_eq!(reconcile(&p), reconcile(&p));
    }

    #[test]
    fn per_phase_keys_follow_reported_stats() {
        let state = reconcile(&payload("migrating_projects", (10, 10), (4, 1)));
        assert_eq!(state.groups(), Some(&PhaseStats::new(10, 10)));
        assert_eq!(state.projects(), Some(&PhaseStats::new(4, 1)));
        assert_eq!(phase_percent(state.projects().unwrap()), 25);
    }

    #[test]
    fn phase_card_percent_rounds_half_up() {
        assert_eq!(phase_percent(&PhaseStats::new(8, 1)), 13);
        assert_eq!(phase_percent(&PhaseStats::new(3, 3)), 100);
        assert_eq!(phase_percent(&PhaseStats::new(1000, 999)), 99);
    }

    #[test]
    fn activity_line_names_current_item() {
        let mut p = payload("migrating_projects", (1, 1), (2, 0));
        if let Some(stats) = p.stats.as_mut() {
            stats.projects.as_mut().unwrap().current_item_name = Some("infra/api".into());
        }
        assert_eq!(reconcile(&p).activity(), "Project: infra/api");

        let p = payload("migrating_groups", (2, 0), (0, 0));
        assert_eq!(reconcile(&p).activity(), "Group: Scanning...");
        assert_eq!(
            reconcile(&RawStatusPayload::with_status("completed")).activity(),
            "Migration Completed!"
        );
    }

    #[test]
    fn client_side_states_are_well_formed() {
        let err = TransportError::Status {
            status: 500,
            body: "boom".into(),
        };
        let state = ReconciledState::fetch_failed(&err);
        assert!(state.is_error && state.is_terminal);
        assert_eq!(state.overall_percent, 0);
        assert_eq!(state.error_message.as_deref(), Some("HTTP 500: boom"));

        let pending = ReconciledState::pending_start();
        assert_eq!(pending.phase, MigrationPhase::Initializing);
        assert_eq!(pending.overall_percent, ACTIVITY_PERCENT);
        assert!(!pending.is_terminal);

        let rejected = ReconciledState::start_rejected("");
        assert_eq!(rejected.display_message, "Failed to start migration on server");
    }

    #[test]
    fn state_serializes_with_wire_phase_names() {
        let state = reconcile(&payload("migrating_groups", (10, 5), (0, 0)));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "migrating_groups");
        assert_eq!(json["overall_percent"], 25);
        assert_eq!(json["per_phase"]["migrating_groups"]["completed"], 5);
    }
}
