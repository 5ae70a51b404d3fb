//! `dexkube render`: write manifests to the gen dir and list them.

use anyhow::Result;

use crate::Context;
use crate::cli::TemplateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: TemplateArgs) -> Result<()> {
    let rendered = super::render_manifests(&args)?;

    if ctx.quiet {
        return Ok(());
    }

    ui::header("Rendered Manifests");
    for path in rendered.paths() {
        ui::dim(&path.display().to_string());
    }
    println!();
    ui::success(&format!("Rendered {} manifest(s)", rendered.len()));
    if !args.deploy_postgres {
        ui::info("postgres-*.yaml skipped (pass --deploy-postgres to include them)");
    }
    Ok(())
}
