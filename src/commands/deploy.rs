//! `dexkube deploy`: render, tear down, recreate.

use anyhow::Result;
use colored::Colorize;
use kubekit::rollout::RolloutCallback;
use kubekit::{Phase, ProcessExecutor, Rollout, TierKind};
use std::path::Path;

use crate::Context;
use crate::cli::DeployArgs;
use crate::runner;
use crate::ui;

pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let (rendered, plan) = super::render_plan(ctx, &args.template)?;
    let kubectl = super::kubectl(&args.kubectl);

    if !ctx.quiet {
        ui::header("Deploying dex");
        ui::kv("Manifests", &rendered.len().to_string());
        ui::kv(
            "Postgres",
            if plan.database.is_some() {
                "deployed"
            } else {
                "external"
            },
        );
        ui::kv("Workers", &args.template.worker_count.to_string());
    }

    if args.dry_run {
        super::plan::print_commands(&plan, &kubectl);
        println!();
        ui::info("Dry run: no kubectl commands were executed");
        return Ok(());
    }

    let executor = ProcessExecutor::new(ctx.verbose > 0);
    let version = runner::kubectl_client_version(&executor, &kubectl)?;
    log::info!("kubectl: {version}");

    let rollout = Rollout::new(&executor, kubectl);
    let mut progress = UiProgress::new(ctx, plan.database.is_some());

    let summary = rollout.run(&plan, &mut progress).map_err(abort)?;

    if !ctx.quiet {
        println!();
        ui::success(&format!("Created {} resource(s)", summary.created.len()));
        if !summary.delete_failures.is_empty() {
            ui::warn(&format!(
                "{} delete(s) failed during teardown and were ignored",
                summary.delete_failures.len()
            ));
        }
    }
    Ok(())
}

/// Prints rollout progress as numbered steps.
struct UiProgress {
    quiet: bool,
    verbose: bool,
    step: usize,
    total: usize,
}

impl UiProgress {
    fn new(ctx: &Context, with_database: bool) -> Self {
        Self {
            quiet: ctx.quiet,
            verbose: ctx.verbose > 0,
            step: 0,
            total: if with_database { 5 } else { 4 },
        }
    }
}

impl RolloutCallback for UiProgress {
    fn on_phase_start(&mut self, phase: Phase) {
        if self.quiet || phase == Phase::Done {
            return;
        }
        self.step += 1;
        println!();
        ui::step(self.step, self.total, &capitalize(phase.description()));
    }

    fn on_delete_failed(&mut self, manifest: &Path, error: &kubekit::Error) {
        if self.verbose {
            ui::dim(&format!("{} not deleted: {}", manifest.display(), error));
        }
    }

    fn on_created(&mut self, kind: TierKind, manifest: &Path) {
        if !self.quiet {
            ui::success(&format!(
                "{} {}",
                kind.name().cyan(),
                manifest.display()
            ));
        }
    }

    fn on_database_pod(&mut self, pod: &str) {
        if !self.quiet {
            ui::kv("Database pod", pod);
            ui::dim("Waiting for the database to accept connections...");
        }
    }
}

/// Show the output of the command that failed; `main` reports the error itself.
fn abort(error: kubekit::Error) -> anyhow::Error {
    if let Some(output) = error.command_output() {
        ui::command_output(output);
    }
    anyhow::Error::new(error).context("Deployment aborted")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
