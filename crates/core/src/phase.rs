use serde::Serialize;
use std::fmt;

/// Discrete stage of the server-side migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    Initializing,
    Running,
    MigratingGroups,
    MigratingProjects,
    Completed,
    Error,
}

impl MigrationPhase {
    pub const ALL: [MigrationPhase; 7] = [
        Self::Idle,
        Self::Initializing,
        Self::Running,
        Self::MigratingGroups,
        Self::MigratingProjects,
        Self::Completed,
        Self::Error,
    ];

    /// Map a raw `status` string. Unknown or empty values are `Idle`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "initializing" => Self::Initializing,
            "running" => Self::Running,
            "migrating_groups" => Self::MigratingGroups,
            "migrating_projects" => Self::MigratingProjects,
            "completed" => Self::Completed,
            "error" => Self::Error,
            _ => Self::Idle,
        }
    }

    /// The wire name, identical to what the server sends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::MigratingGroups => "migrating_groups",
            Self::MigratingProjects => "migrating_projects",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Human label, e.g. `Migrating Groups`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::MigratingGroups => "Migrating Groups",
            Self::MigratingProjects => "Migrating Projects",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// The server is doing work: polling should be running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Running | Self::MigratingGroups | Self::MigratingProjects
        )
    }

    /// Message shown when the server sends no `current_action`.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Idle => "Ready to start migration.",
            Self::Initializing => "Preparing migration...",
            Self::Running => "Migration running.",
            Self::MigratingGroups => "Migrating groups...",
            Self::MigratingProjects => "Migrating projects...",
            Self::Completed => "All tasks finished successfully.",
            Self::Error => "An unspecified error occurred during migration.",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
