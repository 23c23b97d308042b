//! Display-ready activity log built from the server's full log snapshots.
//!
//! The server resends its whole log on every poll, so each merge replaces the
//! rendered log wholesale and never appends. [`LogDelta`] tells line-oriented
//! presenters which entries are new relative to the previous snapshot.

use migration_monitor_api_types::LogEntry;

/// How the latest snapshot relates to the one rendered before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDelta {
    /// Same entries as last time.
    Unchanged,
    /// The previous snapshot is a prefix; entries from index `from` are new.
    Appended { from: usize },
    /// The log no longer extends what was rendered (server restarted the
    /// migration, or the view was cleared).
    Replaced,
}

/// Where the viewer is scrolled, in rows, right before an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPosition {
    /// First visible row.
    pub offset: usize,
    /// Rows visible at once.
    pub viewport: usize,
    /// Rows of content currently rendered.
    pub content: usize,
}

impl ScrollPosition {
    fn distance_from_bottom(&self) -> usize {
        self.content
            .saturating_sub(self.offset.saturating_add(self.viewport))
    }
}

/// Tracks whether the log view should stay pinned to the newest entry.
#[derive(Debug, Clone)]
pub struct FollowTail {
    pub detached_by_user: bool,
    /// Rows from the bottom that still count as "at the bottom".
    pub tolerance_rows: usize,
    was_near_tail_before_update: bool,
}

impl Default for FollowTail {
    fn default() -> Self {
        Self::new(2)
    }
}

impl FollowTail {
    pub fn new(tolerance_rows: usize) -> Self {
        Self {
            detached_by_user: false,
            tolerance_rows,
            was_near_tail_before_update: true,
        }
    }

    pub fn detach(&mut self) {
        self.detached_by_user = true;
    }

    pub fn reattach(&mut self) {
        self.detached_by_user = false;
    }

    /// Record the viewer position before applying an update. `None` means the
    /// presenter has no scrollable viewport, which always counts as at the
    /// bottom.
    pub fn mark_before_update(&mut self, position: Option<ScrollPosition>) {
        self.was_near_tail_before_update =
            position.is_none_or(|p| p.distance_from_bottom() <= self.tolerance_rows);
    }

    pub fn should_follow_after_update(&self) -> bool {
        !self.detached_by_user && self.was_near_tail_before_update
    }
}

/// Result of one merge, borrowed from the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogView<'a> {
    pub entries: &'a [LogEntry],
    pub delta: LogDelta,
    pub should_auto_scroll: bool,
}

impl LogView<'_> {
    /// Entry count shown next to the log.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Entries not present in the previous rendering.
    pub fn new_entries(&self) -> &[LogEntry] {
        match self.delta {
            LogDelta::Unchanged => &[],
            LogDelta::Appended { from } => &self.entries[from.min(self.entries.len())..],
            LogDelta::Replaced => self.entries,
        }
    }
}

/// Owns the last rendered snapshot.
#[derive(Debug, Clone, Default)]
pub struct LogReconciler {
    entries: Vec<LogEntry>,
    follow: FollowTail,
}

impl LogReconciler {
    pub fn new(tolerance_rows: usize) -> Self {
        Self {
            entries: Vec::new(),
            follow: FollowTail::new(tolerance_rows),
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn follow_mut(&mut self) -> &mut FollowTail {
        &mut self.follow
    }

    /// Replace the rendered log with `snapshot`, in snapshot order.
    pub fn merge(&mut self, snapshot: &[LogEntry], position: Option<ScrollPosition>) -> LogView<'_> {
        self.follow.mark_before_update(position);

        let delta = if snapshot == self.entries.as_slice() {
            LogDelta::Unchanged
        } else if snapshot.starts_with(&self.entries) {
            LogDelta::Appended {
                from: self.entries.len(),
            }
        } else {
            LogDelta::Replaced
        };

        match delta {
            LogDelta::Unchanged => {}
            LogDelta::Appended { from } => self.entries.extend_from_slice(&snapshot[from..]),
            LogDelta::Replaced => {
                self.entries.clear();
                self.entries.extend_from_slice(snapshot);
            }
        }

        LogView {
            entries: &self.entries,
            delta,
            should_auto_scroll: self.follow.should_follow_after_update(),
        }
    }

    /// Current rendering without a new snapshot, e.g. alongside an error
    /// state when a poll failed.
    pub fn view(&self) -> LogView<'_> {
        LogView {
            entries: &self.entries,
            delta: LogDelta::Unchanged,
            should_auto_scroll: self.follow.should_follow_after_update(),
        }
    }

    /// Drop the rendered log client-side. The next snapshot repopulates it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
