//! Per-host status rows and the shared progress table.

use serde::Serialize;
use std::fmt;

/// Ordered stages of per-host work. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Phase {
    Pending,
    Connecting,
    RefreshingIndex,
    InstallingCommonCore,
    InstallingHostCore,
    InstallingCommonExternal,
    InstallingHostExternal,
    RenderingCommonTemplates,
    RenderingHostTemplates,
    RunningCommonCommands,
    RunningHostCommands,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Pending => "pending",
            Phase::Connecting => "connecting",
            Phase::RefreshingIndex => "refreshing package index",
            Phase::InstallingCommonCore => "installing common core packages",
            Phase::InstallingHostCore => "installing host core packages",
            Phase::InstallingCommonExternal => "installing common external packages",
            Phase::InstallingHostExternal => "installing host external packages",
            Phase::RenderingCommonTemplates => "rendering common templates",
            Phase::RenderingHostTemplates => "rendering host templates",
            Phase::RunningCommonCommands => "running common commands",
            Phase::RunningHostCommands => "running host commands",
            Phase::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Aggregate status of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Pending,
    InProgress,
    Error,
    Completed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "Pending",
            Status::InProgress => "In Progress",
            Status::Error => "Error",
            Status::Completed => "Completed",
        })
    }
}

/// Completed / total counter for one kind of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { done: 0, total }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

/// Which counter a finished item advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Packages,
    Templates,
    Commands,
}

/// Error taxonomy for a failed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Credential,
    Connect,
    Command,
    Validation,
    Transfer,
    Template,
    NotInstalled,
    UnexpectedOutput,
}

impl FailureKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credential => sshkit::ErrorCategory::Credential.description(),
            Self::Connect => sshkit::ErrorCategory::Connect.description(),
            Self::Command => sshkit::ErrorCategory::Command.description(),
            Self::Validation => sshkit::ErrorCategory::Validation.description(),
            Self::Transfer => sshkit::ErrorCategory::Transfer.description(),
            Self::Template => "Template rendering failed",
            Self::NotInstalled => aptkit::ErrorCategory::NotInstalled.description(),
            Self::UnexpectedOutput => aptkit::ErrorCategory::UnexpectedOutput.description(),
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::Credential => sshkit::ErrorCategory::Credential.advice(),
            Self::Connect => sshkit::ErrorCategory::Connect.advice(),
            Self::Command => sshkit::ErrorCategory::Command.advice(),
            Self::Validation => sshkit::ErrorCategory::Validation.advice(),
            Self::Transfer => sshkit::ErrorCategory::Transfer.advice(),
            Self::Template => "Check the template path, its syntax and the output directory",
            Self::NotInstalled => aptkit::ErrorCategory::NotInstalled.advice(),
            Self::UnexpectedOutput => aptkit::ErrorCategory::UnexpectedOutput.advice(),
        }
    }
}

impl From<sshkit::ErrorCategory> for FailureKind {
    fn from(category: sshkit::ErrorCategory) -> Self {
        match category {
            sshkit::ErrorCategory::Credential => Self::Credential,
            sshkit::ErrorCategory::Connect => Self::Connect,
            sshkit::ErrorCategory::Command => Self::Command,
            sshkit::ErrorCategory::Validation => Self::Validation,
            sshkit::ErrorCategory::Transfer => Self::Transfer,
        }
    }
}

impl From<aptkit::ErrorCategory> for FailureKind {
    fn from(category: aptkit::ErrorCategory) -> Self {
        match category {
            aptkit::ErrorCategory::Remote(inner) => inner.into(),
            aptkit::ErrorCategory::NotInstalled => Self::NotInstalled,
            aptkit::ErrorCategory::UnexpectedOutput => Self::UnexpectedOutput,
        }
    }
}

/// The one authoritative error of a failed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub phase: Phase,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}: {}", self.kind.description(), self.phase, self.message)
    }
}

/// Status row of one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub host: String,
    pub status: Status,
    pub phase: Phase,
    pub packages: Progress,
    pub templates: Progress,
    pub commands: Progress,
    pub failure: Option<Failure>,
}

impl TaskStatus {
    pub fn new(host: impl Into<String>, packages: usize, templates: usize, commands: usize) -> Self {
        Self {
            host: host.into(),
            status: Status::Pending,
            phase: Phase::Pending,
            packages: Progress::new(packages),
            templates: Progress::new(templates),
            commands: Progress::new(commands),
            failure: None,
        }
    }

    pub fn total(&self) -> usize {
        self.packages.total + self.templates.total + self.commands.total
    }

    pub fn counter_mut(&mut self, counter: Counter) -> &mut Progress {
        match counter {
            Counter::Packages => &mut self.packages,
            Counter::Templates => &mut self.templates,
            Counter::Commands => &mut self.commands,
        }
    }
}

/// Rows for every host plus the engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressTable {
    pub total: usize,
    pub completed: usize,
    pub rows: Vec<TaskStatus>,
}

impl ProgressTable {
    pub fn new(rows: Vec<TaskStatus>) -> Self {
        Self {
            total: rows.iter().map(TaskStatus::total).sum(),
            completed: 0,
            rows,
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskStatus> {
        self.rows.iter().filter(|row| row.status == Status::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_forward() {
        assert!(Phase::Connecting < Phase::RefreshingIndex);
        assert!(Phase::RefreshingIndex < Phase::InstallingCommonCore);
        assert!(Phase::RunningHostCommands < Phase::Completed);
    }

    #[test]
    fn test_table_total_sums_rows() {
        let table = ProgressTable::new(vec![
            TaskStatus::new("web1", 3, 1, 2),
            TaskStatus::new("web2", 1, 0, 0),
        ]);
        assert_eq!(table.total, 7);
        assert_eq!(table.completed, 0);
        assert_eq!(table.rows[0].packages.to_string(), "0/3");
    }

    #[test]
    fn test_failure_kind_from_nested_categories() {
        let kind: FailureKind =
            aptkit::ErrorCategory::Remote(sshkit::ErrorCategory::Validation).into();
        assert_eq!(kind, FailureKind::Validation);
        assert_eq!(
            FailureKind::from(aptkit::ErrorCategory::NotInstalled),
            FailureKind::NotInstalled
        );
    }
}
