use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config;

#[derive(Parser)]
#[command(name = "dexkube")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Render dex manifests and roll them out to Kubernetes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v echoes every kubectl command and its output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file with tier layout and retry settings
    /// (default: dexkube.toml in the source directory, if present)
    #[arg(long, global = true, env = "DEXKUBE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render manifests, tear down the old deployment and create the new one
    Deploy(DeployArgs),

    /// Render manifests into the gen directory without touching the cluster
    Render(TemplateArgs),

    /// Render manifests and print the kubectl commands a deploy would run
    Plan(PlanArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared Arguments
// ============================================================================

/// Values substituted into the manifest templates.
#[derive(Args, Clone, Debug)]
pub struct TemplateArgs {
    /// Deploy the postgres pod and service at the default postgres url
    #[arg(long)]
    pub deploy_postgres: bool,

    /// Base64 key used to encrypt secrets
    #[arg(long, env = "DEXKUBE_KEY_SECRETS", default_value = config::DEFAULT_KEY_SECRETS)]
    pub key_secrets: String,

    /// Postgres database url
    #[arg(long, default_value = config::DEFAULT_POSTGRES_URL)]
    pub postgres_url: String,

    /// Kubernetes controller host
    #[arg(long, default_value = config::DEFAULT_K8S_HOST)]
    pub k8s_host: String,

    /// JSON file containing an array of connector objects
    #[arg(long, default_value = config::DEFAULT_CONNECTORS_FILE)]
    pub connectors_json_file: PathBuf,

    /// How many dex workers to run
    #[arg(long, default_value_t = 1)]
    pub worker_count: u32,

    /// Directory containing the *.yaml templates
    #[arg(long, default_value = ".")]
    pub source_dir: PathBuf,

    /// Output directory for rendered manifests (cleared on every run)
    #[arg(long, default_value = config::DEFAULT_GEN_DIR)]
    pub gen_dir: PathBuf,
}

/// How to reach the cluster.
#[derive(Args, Clone, Debug)]
pub struct KubectlArgs {
    /// kubectl binary to run
    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    pub kubectl: String,

    /// API server passed to every kubectl command
    #[arg(long)]
    pub server: Option<String>,

    /// Namespace passed to every kubectl command
    #[arg(long)]
    pub namespace: Option<String>,

    /// Kubeconfig passed to every kubectl command
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,
}

// ============================================================================
// Command Arguments
// ============================================================================

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    #[command(flatten)]
    pub kubectl: KubectlArgs,

    /// Render and show the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    #[command(flatten)]
    pub kubectl: KubectlArgs,
}
