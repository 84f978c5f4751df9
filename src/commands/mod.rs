pub mod apply;
pub mod host;
pub mod init;
pub mod validate;

use crate::config::Config;
use crate::engine::plan::HostPlan;
use crate::ui;
use anyhow::Result;
use std::path::Path;

/// Load a config and refuse it unless it validates.
pub(crate) fn load_validated(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate()?;
    log::info!(
        "loaded {} with {} host(s)",
        path.display(),
        config.hosts.len()
    );
    Ok(config)
}

/// Item counts per host, as the progress table will show them.
pub(crate) fn print_counts(plans: &[HostPlan]) {
    for plan in plans {
        ui::kv(
            plan.address(),
            &format!(
                "{} package(s), {} template(s), {} command(s)",
                plan.package_count(),
                plan.template_count(),
                plan.command_count()
            ),
        );
    }
}
