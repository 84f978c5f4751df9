//! `steward apply`: run the engine against every configured host.

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::plan::{HostPlan, Scope};
use crate::engine::{ApplyOutcome, Engine};
use crate::progress::{NoProgress, ProgressReporter, TableReporter};
use crate::template::MiniJinjaRenderer;
use crate::ui;
use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use sshkit::Ssh2Connector;
use std::path::Path;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let path = &args.config.config;
    let config = super::load_validated(path)?;
    let plans = HostPlan::resolve_all(&config);

    if args.dry_run {
        ui::header("Plan (dry run)");
        for plan in &plans {
            print_plan(ctx, plan);
        }
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Applying {}", path.display()));
        super::print_counts(&plans);
        println!();
    }

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Apply to {} host(s)?", plans.len()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Aborted");
            return Ok(());
        }
    }

    let reporter: Box<dyn ProgressReporter> = if ctx.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(TableReporter::new())
    };
    let outcome = Engine::new(&Ssh2Connector, &MiniJinjaRenderer, reporter.as_ref()).apply(config);

    if !ctx.quiet {
        print_summary(&outcome);
    }

    if !args.no_lock {
        write_lock(ctx, &outcome, path)?;
    }

    let failed = outcome.failed().count();
    if failed > 0 {
        bail!("{failed} host(s) failed to apply");
    }
    Ok(())
}

fn print_summary(outcome: &ApplyOutcome) {
    ui::header("Summary");
    for row in &outcome.table.rows {
        ui::host_summary(row);
    }
    println!();
    if outcome.is_success() {
        ui::success(&format!("All {} host(s) completed", outcome.table.rows.len()));
    }
}

fn write_lock(ctx: &Context, outcome: &ApplyOutcome, source: &Path) -> Result<()> {
    let lock = outcome.config.write_lock(source)?;
    log::info!(
        "wrote {} (generated_at {})",
        lock.display(),
        chrono::Local::now().to_rfc3339()
    );
    if !ctx.quiet {
        ui::dim(&format!("Installed versions recorded in {}", lock.display()));
    }
    Ok(())
}

fn print_plan(ctx: &Context, plan: &HostPlan) {
    println!();
    println!(
        "{} {}",
        plan.address().bold(),
        format!("({}@{}:{})", plan.host.user, plan.host.host, plan.host.port).dimmed()
    );

    for scope in [Scope::Common, Scope::Host] {
        let profile = plan.profile(scope);
        let tag = match scope {
            Scope::Common => "common",
            Scope::Host => "host",
        };

        for pkg in &profile.packages.core {
            let version = pkg.version.as_deref().unwrap_or("latest");
            ui::kv(&format!("{tag} package"), &format!("{} ({version})", pkg.name));
        }
        for group in &profile.packages.external {
            let mut line = format!("{} [{}]", group.name, group.package_names().join(", "));
            if let Some(repo) = &group.repo {
                line.push_str(&format!(" from {repo}"));
            }
            ui::kv(&format!("{tag} external"), &line);
        }
        for template in &profile.templates {
            let sudo = if template.sudo { " (sudo)" } else { "" };
            ui::kv(
                &format!("{tag} template"),
                &format!("{} -> {}{sudo}", template.template_file.display(), template.remote_file),
            );
        }
        for command in &profile.commands {
            let detail = if ctx.verbose > 0 {
                format!("{}: {}", command.name, command.command)
            } else {
                command.name.clone()
            };
            ui::kv(&format!("{tag} command"), &detail);
        }
    }
}
