pub mod deploy;
pub mod plan;
pub mod render;

use anyhow::Result;
use kubekit::{Kubectl, RolloutPlan};

use crate::Context;
use crate::cli::{KubectlArgs, TemplateArgs};
use crate::config::{self, DeployConfig, DeployParams};
use crate::render::{self as renderer, RenderOptions, Rendered};

/// Render templates and build the rollout plan for them.
fn render_plan(ctx: &Context, args: &TemplateArgs) -> Result<(Rendered, RolloutPlan)> {
    let deploy_config = DeployConfig::resolve(ctx.config.as_deref(), &args.source_dir)?;
    let rendered = render_manifests(args)?;
    let plan = deploy_config.plan(&rendered, args.deploy_postgres)?;
    Ok((rendered, plan))
}

/// Render templates into the gen dir.
fn render_manifests(args: &TemplateArgs) -> Result<Rendered> {
    let params = DeployParams::from_args(args)?;
    let opts = RenderOptions {
        source_dir: args.source_dir.clone(),
        gen_dir: config::gen_dir(args),
        include_database: args.deploy_postgres,
    };
    renderer::render_all(&params, &opts)
}

/// Build the kubectl command builder from CLI flags.
fn kubectl(args: &KubectlArgs) -> Kubectl {
    let mut kubectl = Kubectl::new(&args.kubectl);
    if let Some(server) = &args.server {
        kubectl = kubectl.with_server(server);
    }
    if let Some(namespace) = &args.namespace {
        kubectl = kubectl.with_namespace(namespace);
    }
    if let Some(path) = &args.kubeconfig {
        kubectl = kubectl.with_kubeconfig(path);
    }
    kubectl
}
