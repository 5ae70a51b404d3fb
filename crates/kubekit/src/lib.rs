//! # kubekit
//!
//! Ordered kubectl rollouts for multi-tier services.
//!
//! This crate provides functionality for:
//! - Running external commands with combined stdout/stderr capture
//! - Retrying eventually-consistent cluster checks at a fixed interval
//! - Tearing down and recreating a database, coordinator and worker tier in
//!   dependency order
//!
//! ## Example
//!
//! ```no_run
//! use kubekit::{DatabaseTier, Kubectl, ProcessExecutor, Rollout, RolloutPlan, Tier, TierKind};
//! use kubekit::rollout::NoProgress;
//! use std::path::PathBuf;
//!
//! let plan = RolloutPlan::new(
//!     Some(DatabaseTier::postgres(vec![PathBuf::from("gen/postgres-rc.yaml")])),
//!     Tier::new(TierKind::Coordinator, vec![PathBuf::from("gen/dex-overlord-rc.yaml")]),
//!     Tier::new(TierKind::Worker, vec![PathBuf::from("gen/dex-worker-rc.yaml")]),
//! );
//!
//! let rollout = Rollout::new(ProcessExecutor::new(true), Kubectl::default());
//! let summary = rollout.run(&plan, &mut NoProgress).expect("rollout failed");
//! println!("created {} resources", summary.created.len());
//! ```
//!
//! ## Retry Logic
//!
//! Readiness checks are retried with a fixed delay and no backoff. Configure
//! them per plan with [`RetryPolicy`].
//!
//! ```no_run
//! use kubekit::{Kubectl, ProcessExecutor, RetryPolicy, retry};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(5, Duration::from_secs(3));
//! let probe = Kubectl::default().get_nodes();
//! retry::run_with_retry(
//!     &ProcessExecutor::new(false),
//!     &probe,
//!     &policy,
//!     Some(&retry::LogCallback),
//!     &retry::ThreadSleeper,
//! )
//! .expect("control plane unreachable");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod kubectl;
pub mod retry;
pub mod rollout;
pub mod types;

pub use backend::{Executor, ProcessExecutor};
pub use error::{Error, Result};
pub use kubectl::Kubectl;
pub use rollout::{Rollout, RolloutCallback};
pub use types::{
    CommandInvocation, CommandOutput, DatabaseTier, Failure, Phase, RetryPolicy, RolloutPlan,
    RolloutSummary, Tier, TierKind,
};
