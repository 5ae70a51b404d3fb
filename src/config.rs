use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kubekit::{DatabaseTier, RetryPolicy, RolloutPlan, Tier, TierKind};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::TemplateArgs;
use crate::render::Rendered;

pub const DEFAULT_KEY_SECRETS: &str =
    "ZUhoNGVIaDRlSGg0ZUhoNGVIaDRlSGg0ZUhoNGVIaDRlSGg0ZUhoNGVIZz0=";
pub const DEFAULT_POSTGRES_URL: &str =
    "postgres://postgres@dex-postgres.default:5432/postgres?sslmode=disable";
pub const DEFAULT_K8S_HOST: &str = "http://172.17.4.99:30556";
pub const DEFAULT_CONNECTORS_FILE: &str = "./connectors.json";
pub const DEFAULT_GEN_DIR: &str = "./gen";

/// Config file looked up in the source directory when --config is not given
pub const CONFIG_FILE_NAME: &str = "dexkube.toml";

// ============================================================================
// Template Parameters
// ============================================================================

/// Values available to manifest templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployParams {
    pub key_secrets: String,
    pub postgres_url: String,
    pub k8s_host: String,
    /// Base64 of the connectors JSON file
    pub connectors_json: String,
    pub worker_count: u32,
}

impl DeployParams {
    /// Build parameters from CLI arguments, reading the connectors file.
    pub fn from_args(args: &TemplateArgs) -> Result<Self> {
        if args.deploy_postgres && args.postgres_url != DEFAULT_POSTGRES_URL {
            bail!("Defining --postgres-url and --deploy-postgres together is not supported");
        }
        if args.worker_count == 0 {
            bail!("--worker-count must be at least 1");
        }

        let connectors = fs::read(&args.connectors_json_file).with_context(|| {
            format!(
                "Could not read connectors file {}",
                args.connectors_json_file.display()
            )
        })?;

        Ok(Self {
            key_secrets: args.key_secrets.clone(),
            postgres_url: args.postgres_url.clone(),
            k8s_host: args.k8s_host.clone(),
            connectors_json: encode_connectors(&connectors)?,
            worker_count: args.worker_count,
        })
    }

    /// Look up a template field by its template name.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "KeySecrets" => Some(self.key_secrets.clone()),
            "PostgresUrl" => Some(self.postgres_url.clone()),
            "K8sHost" => Some(self.k8s_host.clone()),
            "ConnectorsJSON" => Some(self.connectors_json.clone()),
            "WorkerCount" => Some(self.worker_count.to_string()),
            _ => None,
        }
    }
}

/// Validate that the connectors file is a JSON array and base64-encode it.
pub fn encode_connectors(raw: &[u8]) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).context("Connectors file is not valid JSON")?;
    if !value.is_array() {
        bail!("Connectors file must contain a JSON array of connector objects");
    }
    Ok(STANDARD.encode(raw))
}

// ============================================================================
// Deploy Config File
// ============================================================================

/// Tier layout and retry settings, loaded from `dexkube.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub tiers: TiersConfig,
    pub probe: RetrySettings,
    pub readiness: ReadinessConfig,
}

/// Manifest file names per tier, in creation order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TiersConfig {
    pub database: Vec<String>,
    pub coordinator: Vec<String>,
    pub worker: Vec<String>,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            database: strings(&["postgres-rc.yaml", "postgres-service.yaml"]),
            coordinator: strings(&["dex-overlord-rc.yaml", "dex-overlord-service.yaml"]),
            worker: strings(&["dex-worker-rc.yaml", "dex-worker-service.yaml"]),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: u32,
    pub interval_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(RetryPolicy::probe())
    }
}

impl From<RetryPolicy> for RetrySettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            attempts: policy.max_attempts,
            interval_secs: policy.interval.as_secs(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.interval_secs))
    }
}

/// Database readiness check settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    pub attempts: u32,
    pub interval_secs: u64,
    /// Label selector for the database pod
    pub selector: String,
    /// Command run inside the database pod
    pub command: Vec<String>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        let policy = RetrySettings::from(RetryPolicy::readiness());
        let postgres = DatabaseTier::postgres(Vec::new());
        Self {
            attempts: policy.attempts,
            interval_secs: policy.interval_secs,
            selector: postgres.selector,
            command: postgres.readiness_command,
        }
    }
}

impl DeployConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit config, else `dexkube.toml` in `source_dir`, else defaults.
    pub fn resolve(explicit: Option<&Path>, source_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = source_dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            log::info!("using config {}", candidate.display());
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.probe.attempts == 0 || self.readiness.attempts == 0 {
            bail!("Retry attempts must be at least 1");
        }
        if self.readiness.command.is_empty() {
            bail!("[readiness] command must not be empty");
        }
        if self.tiers.coordinator.is_empty() {
            bail!("[tiers] coordinator must list at least one manifest");
        }
        Ok(())
    }

    /// Build the rollout plan from rendered manifests.
    ///
    /// The database tier is only part of the plan when `include_database` is set.
    pub fn plan(&self, rendered: &Rendered, include_database: bool) -> Result<RolloutPlan> {
        let database = if include_database {
            Some(DatabaseTier {
                tier: Tier::new(TierKind::Database, rendered.resolve(&self.tiers.database)?),
                selector: self.readiness.selector.clone(),
                readiness_command: self.readiness.command.clone(),
            })
        } else {
            None
        };

        let plan = RolloutPlan::new(
            database,
            Tier::new(
                TierKind::Coordinator,
                rendered.resolve(&self.tiers.coordinator)?,
            ),
            Tier::new(TierKind::Worker, rendered.resolve(&self.tiers.worker)?),
        )
        .with_probe(self.probe.policy())
        .with_readiness(
            RetrySettings {
                attempts: self.readiness.attempts,
                interval_secs: self.readiness.interval_secs,
            }
            .policy(),
        );
        Ok(plan)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Where rendered manifests go for the given args.
pub fn gen_dir(args: &TemplateArgs) -> PathBuf {
    if args.gen_dir.is_absolute() {
        args.gen_dir.clone()
    } else {
        args.source_dir.join(&args.gen_dir)
    }
}

// ============================================================================
// Tests
// ============================================================================
