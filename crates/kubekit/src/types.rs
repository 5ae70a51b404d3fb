//! Core types for kubectl rollouts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An external command: program name plus ordered arguments.
///
/// Invocations are immutable once built; the orchestrator creates a fresh one
/// for every command it issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    program: String,
    args: Vec<String>,
}

impl CommandInvocation {
    /// Create an invocation from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The executable name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The ordered argument list.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The process could not be started.
    Launch(String),
    /// The process exited unsuccessfully. `None` when terminated by a signal.
    Exit(Option<i32>),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Launch(message) => write!(f, "failed to launch: {message}"),
            Failure::Exit(Some(code)) => write!(f, "exit status {code}"),
            Failure::Exit(None) => write!(f, "terminated by signal"),
        }
    }
}

/// Result of running a command: interleaved stdout/stderr plus outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout and stderr, in write order
    pub combined: Vec<u8>,
    /// Set when the command failed to launch or exited non-zero
    pub failure: Option<Failure>,
}

impl CommandOutput {
    /// A successful result with the given output.
    pub fn success(combined: impl Into<Vec<u8>>) -> Self {
        Self {
            combined: combined.into(),
            failure: None,
        }
    }

    /// A failed result with the given output.
    pub fn failed(combined: impl Into<Vec<u8>>, failure: Failure) -> Self {
        Self {
            combined: combined.into(),
            failure: Some(failure),
        }
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Combined output as (lossy) UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1)
    pub max_attempts: u32,
    /// Delay between attempts
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a policy. An attempt count of zero is raised to one.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Default policy for the control-plane probe.
    pub fn probe() -> Self {
        Self::new(5, Duration::from_secs(3))
    }

    /// Default policy for database readiness.
    pub fn readiness() -> Self {
        Self::new(20, Duration::from_secs(3))
    }

    /// A policy that runs exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Dependency level of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    /// Backing database (optional)
    Database,
    /// Coordinator, depends on the database when present
    Coordinator,
    /// Workers, depend on the coordinator
    Worker,
}

impl TierKind {
    /// Deletion order, the reverse of creation.
    pub const DELETE_ORDER: [TierKind; 3] =
        [TierKind::Worker, TierKind::Coordinator, TierKind::Database];

    /// Short name used in output.
    pub fn name(&self) -> &'static str {
        match self {
            TierKind::Database => "database",
            TierKind::Coordinator => "coordinator",
            TierKind::Worker => "worker",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered group of rendered manifests sharing a dependency level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Which level this tier sits at
    pub kind: TierKind,
    /// Manifest paths in declared order
    pub manifests: Vec<PathBuf>,
}

impl Tier {
    /// Create a tier from its manifest paths.
    pub fn new(kind: TierKind, manifests: Vec<PathBuf>) -> Self {
        Self { kind, manifests }
    }

    /// Iterate over manifest paths in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.manifests.iter().map(PathBuf::as_path)
    }
}

/// The database tier plus what is needed to check it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTier {
    /// Database manifests
    pub tier: Tier,
    /// Label selector used to find the database pod (e.g. `app=postgres`)
    pub selector: String,
    /// Command executed inside the pod to verify it accepts connections
    pub readiness_command: Vec<String>,
}

impl DatabaseTier {
    /// Create a postgres database tier with the default readiness check.
    pub fn postgres(manifests: Vec<PathBuf>) -> Self {
        Self {
            tier: Tier::new(TierKind::Database, manifests),
            selector: "app=postgres".to_string(),
            readiness_command: ["psql", "-U", "postgres", "-c", "SELECT 1"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Everything a rollout needs, supplied by the caller.
#[derive(Debug, Clone)]
pub struct RolloutPlan {
    /// Database tier; `None` disables every database step
    pub database: Option<DatabaseTier>,
    /// Coordinator tier
    pub coordinator: Tier,
    /// Worker tier
    pub worker: Tier,
    /// Retry policy for the control-plane probe
    pub probe: RetryPolicy,
    /// Retry policy for database readiness
    pub readiness: RetryPolicy,
}

impl RolloutPlan {
    /// Create a plan with default retry policies.
    pub fn new(database: Option<DatabaseTier>, coordinator: Tier, worker: Tier) -> Self {
        Self {
            database,
            coordinator,
            worker,
            probe: RetryPolicy::probe(),
            readiness: RetryPolicy::readiness(),
        }
    }

    /// Set the probe policy.
    pub fn with_probe(mut self, policy: RetryPolicy) -> Self {
        self.probe = policy;
        self
    }

    /// Set the readiness policy.
    pub fn with_readiness(mut self, policy: RetryPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// The tier of the given kind, if present.
    pub fn tier(&self, kind: TierKind) -> Option<&Tier> {
        match kind {
            TierKind::Database => self.database.as_ref().map(|db| &db.tier),
            TierKind::Coordinator => Some(&self.coordinator),
            TierKind::Worker => Some(&self.worker),
        }
    }
}

/// Stage of a rollout, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Control-plane reachability check
    Probe,
    /// Best-effort deletion of existing resources
    Teardown,
    /// Database creation and readiness
    CreateDatabase,
    /// Coordinator creation
    CreateCoordinator,
    /// Worker creation
    CreateWorkers,
    /// Finished
    Done,
}

impl Phase {
    /// Human-readable description of the phase.
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Probe => "probe control plane",
            Phase::Teardown => "tear down existing resources",
            Phase::CreateDatabase => "create database tier",
            Phase::CreateCoordinator => "create coordinator tier",
            Phase::CreateWorkers => "create worker tier",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What a completed rollout did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutSummary {
    /// Delete commands that failed and were ignored
    pub delete_failures: Vec<PathBuf>,
    /// Manifests created, in order
    pub created: Vec<PathBuf>,
    /// Name of the database pod that passed the readiness check
    pub database_pod: Option<String>,
}
