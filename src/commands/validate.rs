use crate::Context;
use crate::cli::ConfigArg;
use crate::engine::plan::HostPlan;
use crate::ui;
use anyhow::Result;

pub fn run(ctx: &Context, args: &ConfigArg) -> Result<()> {
    let config = super::load_validated(&args.config)?;
    if ctx.quiet {
        return Ok(());
    }

    ui::success(&format!("{} is valid", args.config.display()));
    ui::header("Hosts");
    super::print_counts(&HostPlan::resolve_all(&config));
    Ok(())
}
