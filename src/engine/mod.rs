//! Apply engine.
//!
//! The engine fans out one task per host and joins them all:
//! 1. Resolve each host's plan (common items merged with host items)
//! 2. Run every plan concurrently, updating a shared progress table
//! 3. Merge the versions each host discovered back into the config
//!
//! `apply` never fails as a whole. A host that hits an error stops, keeps
//! its `Error` row with the failure, and leaves other hosts alone.

pub mod host;
pub mod plan;
pub mod status;

use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::template::TemplateRenderer;
use log::{info, warn};
use plan::{HostPlan, Scope};
use rayon::prelude::*;
use serde::Serialize;
use sshkit::Connector;
use status::{Counter, Failure, Phase, ProgressTable, Status, TaskStatus};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A version discovered on one host after installing a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledVersion {
    pub scope: Scope,
    /// External group the package belongs to; `None` for core packages
    pub group: Option<String>,
    pub package: String,
    pub version: String,
}

/// Result of an apply run.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// Config annotated with discovered versions
    pub config: Config,
    /// Final status of every host
    pub table: ProgressTable,
    /// Versions per host address
    pub versions: BTreeMap<String, Vec<InstalledVersion>>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.table.rows.iter().all(|row| row.status == Status::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskStatus> {
        self.table.failed()
    }
}

/// The progress table plus the reporter that draws it, behind one lock.
pub(crate) struct Tracker<'a> {
    table: Mutex<ProgressTable>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Tracker<'a> {
    fn new(table: ProgressTable, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            table: Mutex::new(table),
            reporter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to row `index` and redraw while still holding the lock.
    fn update(&self, index: usize, change: impl FnOnce(&mut TaskStatus, &mut usize)) {
        let mut table = self.lock();
        let table = &mut *table;
        if let Some(row) = table.rows.get_mut(index) {
            change(row, &mut table.completed);
        }
        self.reporter.render(table);
    }

    pub(crate) fn redraw(&self) {
        let table = self.lock();
        self.reporter.render(&table);
    }

    pub(crate) fn enter(&self, index: usize, phase: Phase) {
        self.update(index, |row, _| {
            row.status = Status::InProgress;
            row.phase = phase;
        });
    }

    pub(crate) fn advance(&self, index: usize, counter: Counter) {
        self.update(index, |row, completed| {
            row.counter_mut(counter).done += 1;
            *completed += 1;
        });
    }

    pub(crate) fn complete(&self, index: usize) {
        self.update(index, |row, _| {
            row.status = Status::Completed;
            row.phase = Phase::Completed;
        });
    }

    pub(crate) fn fail(&self, index: usize, failure: Failure) {
        self.update(index, |row, _| {
            row.status = Status::Error;
            row.failure = Some(failure);
        });
    }

    fn into_table(self) -> ProgressTable {
        self.table.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs plans against a fleet.
pub struct Engine<'a> {
    connector: &'a dyn Connector,
    renderer: &'a dyn TemplateRenderer,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Engine<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        renderer: &'a dyn TemplateRenderer,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            connector,
            renderer,
            reporter,
        }
    }

    /// Apply `config` to every host and wait for all of them.
    pub fn apply(&self, config: Config) -> ApplyOutcome {
        let plans = HostPlan::resolve_all(&config);
        let rows = plans
            .iter()
            .map(|plan| {
                TaskStatus::new(
                    plan.address(),
                    plan.package_count(),
                    plan.template_count(),
                    plan.command_count(),
                )
            })
            .collect();
        let tracker = Tracker::new(ProgressTable::new(rows), self.reporter);
        tracker.redraw();

        info!("applying configuration to {} host(s)", plans.len());
        let discovered = self.fan_out(&plans, &tracker);
        let table = tracker.into_table();

        let versions: BTreeMap<String, Vec<InstalledVersion>> = plans
            .iter()
            .zip(discovered)
            .map(|(plan, found)| (plan.address().to_string(), found))
            .collect();
        let config = annotate(config, &versions);

        info!(
            "apply finished: {} completed, {} failed",
            table
                .rows
                .iter()
                .filter(|r| r.status == Status::Completed)
                .count(),
            table.failed().count()
        );
        ApplyOutcome {
            config,
            table,
            versions,
        }
    }

    /// One task per host on a pool as wide as the fleet. Results come back
    /// in plan order.
    fn fan_out(&self, plans: &[HostPlan], tracker: &Tracker<'_>) -> Vec<Vec<InstalledVersion>> {
        let run_all = || {
            plans
                .par_iter()
                .enumerate()
                .map(|(index, plan)| {
                    host::run(index, plan, self.connector, self.renderer, tracker)
                })
                .collect::<Vec<_>>()
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(plans.len().max(1))
            .thread_name(|i| format!("steward-host-{i}"))
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!("could not build host pool ({e}), using the global pool");
                run_all()
            }
        }
    }
}

/// Write discovered versions into the config.
///
/// Host items take their host's version. A common item takes a version
/// only when every host that installed it agrees.
fn annotate(mut config: Config, versions: &BTreeMap<String, Vec<InstalledVersion>>) -> Config {
    let mut common: BTreeMap<(Option<&str>, &str), Vec<&str>> = BTreeMap::new();

    for host in &mut config.hosts {
        let Some(found) = versions.get(&host.host) else {
            continue;
        };
        for record in found {
            match record.scope {
                Scope::Host => set_version(&mut host.profile, record),
                Scope::Common => common
                    .entry((record.group.as_deref(), record.package.as_str()))
                    .or_default()
                    .push(record.version.as_str()),
            }
        }
    }

    for ((group, package), reported) in common {
        let Some(&first) = reported.first() else {
            continue;
        };
        if reported.iter().all(|v| *v == first) {
            set_version(
                &mut config.common,
                &InstalledVersion {
                    scope: Scope::Common,
                    group: group.map(str::to_string),
                    package: package.to_string(),
                    version: first.to_string(),
                },
            );
        } else {
            warn!(
                "hosts disagree on the installed version of common package '{package}' ({}); leaving it unpinned",
                reported.join(", ")
            );
        }
    }

    config
}

fn set_version(profile: &mut crate::config::Profile, record: &InstalledVersion) {
    match &record.group {
        None => {
            if let Some(pkg) = profile
                .packages
                .core
                .iter_mut()
                .find(|p| p.name == record.package)
            {
                pkg.version = Some(record.version.clone());
            }
        }
        Some(group) => {
            if let Some(group) = profile
                .packages
                .external
                .iter_mut()
                .find(|g| &g.name == group)
            {
                group
                    .installed
                    .insert(record.package.clone(), record.version.clone());
            }
        }
    }
}
