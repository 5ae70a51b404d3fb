//! `dexkube plan`: show the kubectl commands a deploy would run.

use anyhow::Result;
use colored::Colorize;
use kubekit::{Kubectl, Phase, RolloutPlan};

use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let (_, plan) = super::render_plan(ctx, &args.template)?;
    print_commands(&plan, &super::kubectl(&args.kubectl));
    Ok(())
}

/// Print the command sequence grouped by phase.
pub fn print_commands(plan: &RolloutPlan, kubectl: &Kubectl) {
    ui::header("Rollout Plan");

    let mut current: Option<Phase> = None;
    for (phase, invocation) in plan.commands(kubectl) {
        if current != Some(phase) {
            ui::section(&phase.to_string());
            current = Some(phase);
        }
        println!("  {}", invocation.to_string().dimmed());
    }

    println!();
    ui::kv(
        "Probe",
        &format!(
            "{} attempt(s), {}s apart",
            plan.probe.max_attempts,
            plan.probe.interval.as_secs()
        ),
    );
    if plan.database.is_some() {
        ui::kv(
            "Database readiness",
            &format!(
                "{} attempt(s), {}s apart",
                plan.readiness.max_attempts,
                plan.readiness.interval.as_secs()
            ),
        );
    }
    ui::dim("Teardown failures are ignored; any other failure aborts the rollout.");
}
