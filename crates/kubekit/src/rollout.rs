//! Ordered rollout: probe, best-effort teardown, then tier-by-tier creation.

use crate::backend::Executor;
use crate::error::{Error, Result};
use crate::kubectl::Kubectl;
use crate::retry::{self, LogCallback, RetryCallback, Sleeper, ThreadSleeper};
use crate::types::{
    CommandInvocation, DatabaseTier, Phase, RetryPolicy, RolloutPlan, RolloutSummary, Tier,
    TierKind,
};
use std::path::Path;

/// Placeholder shown for the pod name when listing commands ahead of time.
pub const POD_PLACEHOLDER: &str = "<pod>";

/// Progress callback for rollouts.
///
/// Implement this trait to receive progress updates during a rollout.
pub trait RolloutCallback {
    /// Called when a phase begins.
    fn on_phase_start(&mut self, phase: Phase);

    /// Called when a teardown delete failed and was ignored.
    fn on_delete_failed(&mut self, manifest: &Path, error: &Error);

    /// Called after a manifest was created.
    fn on_created(&mut self, kind: TierKind, manifest: &Path);

    /// Called once the database pod has been found.
    fn on_database_pod(&mut self, pod: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl RolloutCallback for NoProgress {
    fn on_phase_start(&mut self, _phase: Phase) {}
    fn on_delete_failed(&mut self, _manifest: &Path, _error: &Error) {}
    fn on_created(&mut self, _kind: TierKind, _manifest: &Path) {}
    fn on_database_pod(&mut self, _pod: &str) {}
}

/// Drives a [`RolloutPlan`] against a cluster.
pub struct Rollout<'a, E: Executor> {
    executor: E,
    kubectl: Kubectl,
    sleeper: &'a dyn Sleeper,
    retry_callback: &'a dyn RetryCallback,
}

impl<E: Executor> Rollout<'static, E> {
    /// Create a rollout that sleeps for real and logs retries.
    pub fn new(executor: E, kubectl: Kubectl) -> Self {
        Self {
            executor,
            kubectl,
            sleeper: &ThreadSleeper,
            retry_callback: &LogCallback,
        }
    }
}

impl<'a, E: Executor> Rollout<'a, E> {
    /// Replace the sleeper used between retry attempts.
    pub fn with_sleeper(self, sleeper: &'a dyn Sleeper) -> Rollout<'a, E> {
        Rollout {
            executor: self.executor,
            kubectl: self.kubectl,
            sleeper,
            retry_callback: self.retry_callback,
        }
    }

    /// Replace the retry notification callback.
    pub fn with_retry_callback(self, callback: &'a dyn RetryCallback) -> Rollout<'a, E> {
        Rollout {
            executor: self.executor,
            kubectl: self.kubectl,
            sleeper: self.sleeper,
            retry_callback: callback,
        }
    }

    /// Run the full sequence.
    ///
    /// Probe → Teardown → CreateDatabase (if enabled) → CreateCoordinator →
    /// CreateWorkers. The first fatal error stops the run; nothing already
    /// created is rolled back.
    pub fn run<P: RolloutCallback>(
        &self,
        plan: &RolloutPlan,
        progress: &mut P,
    ) -> Result<RolloutSummary> {
        let mut summary = RolloutSummary::default();

        progress.on_phase_start(Phase::Probe);
        self.probe(plan).map_err(|e| e.in_phase(Phase::Probe))?;

        progress.on_phase_start(Phase::Teardown);
        self.teardown(plan, &mut summary, progress);

        if let Some(database) = &plan.database {
            progress.on_phase_start(Phase::CreateDatabase);
            let pod = self
                .create_database(database, plan, &mut summary, progress)
                .map_err(|e| e.in_phase(Phase::CreateDatabase))?;
            summary.database_pod = Some(pod);
        }

        progress.on_phase_start(Phase::CreateCoordinator);
        self.create_tier(&plan.coordinator, &mut summary, progress)
            .map_err(|e| e.in_phase(Phase::CreateCoordinator))?;

        progress.on_phase_start(Phase::CreateWorkers);
        self.create_tier(&plan.worker, &mut summary, progress)
            .map_err(|e| e.in_phase(Phase::CreateWorkers))?;

        progress.on_phase_start(Phase::Done);
        log::info!(
            "rollout complete: {} created, {} delete(s) ignored",
            summary.created.len(),
            summary.delete_failures.len()
        );
        Ok(summary)
    }

    fn retry(&self, invocation: &CommandInvocation, policy: &RetryPolicy) -> Result<String> {
        retry::run_with_retry(
            &self.executor,
            invocation,
            policy,
            Some(self.retry_callback),
            self.sleeper,
        )
    }

    fn probe(&self, plan: &RolloutPlan) -> Result<()> {
        self.retry(&self.kubectl.get_nodes(), &plan.probe)?;
        Ok(())
    }

    fn teardown<P: RolloutCallback>(
        &self,
        plan: &RolloutPlan,
        summary: &mut RolloutSummary,
        progress: &mut P,
    ) {
        for kind in TierKind::DELETE_ORDER {
            let Some(tier) = plan.tier(kind) else {
                continue;
            };
            for manifest in tier.iter() {
                // The resource may not exist yet.
                if let Err(e) = self.executor.run_checked(&self.kubectl.delete(manifest)) {
                    log::debug!("ignoring failed delete of {}: {e}", manifest.display());
                    progress.on_delete_failed(manifest, &e);
                    summary.delete_failures.push(manifest.to_path_buf());
                }
            }
        }
    }

    fn create_database<P: RolloutCallback>(
        &self,
        database: &DatabaseTier,
        plan: &RolloutPlan,
        summary: &mut RolloutSummary,
        progress: &mut P,
    ) -> Result<String> {
        self.create_tier(&database.tier, summary, progress)?;

        let pod = self.find_pod(&database.selector, &plan.readiness)?;
        log::info!("database pod: {pod}");
        progress.on_database_pod(&pod);

        let check = self.kubectl.exec(&pod, &database.readiness_command);
        self.retry(&check, &plan.readiness)?;
        Ok(pod)
    }

    /// Wait for the database pod to show up.
    ///
    /// The lookup is retried under the readiness policy. When several pods
    /// match, the most recently created one is used.
    fn find_pod(&self, selector: &str, policy: &RetryPolicy) -> Result<String> {
        let lookup = self.kubectl.pod_names(selector);
        let mut attempts = 0;
        let result = retry::with_retry(policy, Some(self.retry_callback), self.sleeper, |attempt| {
            attempts = attempt;
            let output = self.executor.run_checked(&lookup)?;
            newest_pod(&output).ok_or_else(|| Error::PodNotFound {
                selector: selector.to_string(),
            })
        });
        result.map_err(|last| Error::RetryExhausted {
            invocation: lookup,
            attempts,
            last: Box::new(last),
        })
    }

    fn create_tier<P: RolloutCallback>(
        &self,
        tier: &Tier,
        summary: &mut RolloutSummary,
        progress: &mut P,
    ) -> Result<()> {
        for manifest in tier.iter() {
            self.executor.run_checked(&self.kubectl.create(manifest))?;
            progress.on_created(tier.kind, manifest);
            summary.created.push(manifest.to_path_buf());
        }
        Ok(())
    }
}

/// Last non-empty line of the pod lookup output.
///
/// The lookup lists pods oldest first, so this is the newest pod.
fn newest_pod(output: &str) -> Option<String> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

impl RolloutPlan {
    /// Every command a rollout of this plan would issue, in order, with the
    /// phase it belongs to.
    ///
    /// The database pod is not known ahead of time, so the readiness check is
    /// shown against [`POD_PLACEHOLDER`].
    pub fn commands(&self, kubectl: &Kubectl) -> Vec<(Phase, CommandInvocation)> {
        let mut commands = vec![(Phase::Probe, kubectl.get_nodes())];

        for kind in TierKind::DELETE_ORDER {
            if let Some(tier) = self.tier(kind) {
                commands.extend(tier.iter().map(|m| (Phase::Teardown, kubectl.delete(m))));
            }
        }

        if let Some(database) = &self.database {
            commands.extend(
                database
                    .tier
                    .iter()
                    .map(|m| (Phase::CreateDatabase, kubectl.create(m))),
            );
            commands.push((Phase::CreateDatabase, kubectl.pod_names(&database.selector)));
            commands.push((
                Phase::CreateDatabase,
                kubectl.exec(POD_PLACEHOLDER, &database.readiness_command),
            ));
        }

        commands.extend(
            self.coordinator
                .iter()
                .map(|m| (Phase::CreateCoordinator, kubectl.create(m))),
        );
        commands.extend(
            self.worker
                .iter()
                .map(|m| (Phase::CreateWorkers, kubectl.create(m))),
        );
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NoCallback;
    use crate::types::{CommandOutput, Failure};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Fake executor answering by command line, recording every call.
    ///
    /// A rule matches when the command line contains its pattern. Each rule
    /// holds a queue of results; the last one repeats once the queue drains.
    /// Unmatched commands succeed with empty output.
    #[derive(Default)]
    struct ScriptedExecutor {
        rules: Vec<(String, RefCell<Vec<CommandOutput>>)>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn on(mut self, pattern: &str, results: Vec<CommandOutput>) -> Self {
            self.rules.push((pattern.to_string(), RefCell::new(results)));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn count(&self, pattern: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.contains(pattern)).count()
        }

        fn position(&self, pattern: &str) -> Option<usize> {
            self.calls.borrow().iter().position(|c| c.contains(pattern))
        }
    }

    impl Executor for ScriptedExecutor {
        fn run(&self, invocation: &CommandInvocation) -> CommandOutput {
            let line = invocation.to_string();
            self.calls.borrow_mut().push(line.clone());
            for (pattern, results) in &self.rules {
                if line.contains(pattern.as_str()) {
                    let mut results = results.borrow_mut();
                    return if results.len() > 1 {
                        results.remove(0)
                    } else {
                        results.first().cloned().unwrap_or_default()
                    };
                }
            }
            CommandOutput::success("")
        }
    }

    #[derive(Default)]
    struct RecordingSleeper(RefCell<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Vec<Phase>,
        created: Vec<(TierKind, PathBuf)>,
        delete_failures: usize,
        pod: Option<String>,
    }

    impl RolloutCallback for RecordingProgress {
        fn on_phase_start(&mut self, phase: Phase) {
            self.phases.push(phase);
        }
        fn on_delete_failed(&mut self, _manifest: &Path, _error: &Error) {
            self.delete_failures += 1;
        }
        fn on_created(&mut self, kind: TierKind, manifest: &Path) {
            self.created.push((kind, manifest.to_path_buf()));
        }
        fn on_database_pod(&mut self, pod: &str) {
            self.pod = Some(pod.to_string());
        }
    }

    fn fail(output: &str) -> CommandOutput {
        CommandOutput::failed(output, Failure::Exit(Some(1)))
    }

    fn ok(output: &str) -> CommandOutput {
        CommandOutput::success(output)
    }

    fn tier(kind: TierKind, names: &[&str]) -> Tier {
        Tier::new(kind, names.iter().map(|n| PathBuf::from(format!("gen/{n}"))).collect())
    }

    fn plan(with_database: bool) -> RolloutPlan {
        let database = with_database.then(|| {
            let mut db = DatabaseTier::postgres(vec![]);
            db.tier = tier(TierKind::Database, &["postgres-rc.yaml", "postgres-service.yaml"]);
            db
        });
        RolloutPlan::new(
            database,
            tier(TierKind::Coordinator, &["dex-overlord-rc.yaml", "dex-overlord-service.yaml"]),
            tier(TierKind::Worker, &["dex-worker-rc.yaml", "dex-worker-service.yaml"]),
        )
        .with_probe(RetryPolicy::new(5, Duration::from_secs(3)))
        .with_readiness(RetryPolicy::new(20, Duration::from_secs(2)))
    }

    fn with_pod(executor: ScriptedExecutor) -> ScriptedExecutor {
        executor.on("get pods", vec![ok("postgres-abc12\n")])
    }

    fn rollout<'a>(
        executor: &'a ScriptedExecutor,
        sleeper: &'a RecordingSleeper,
    ) -> Rollout<'a, &'a ScriptedExecutor> {
        Rollout::new(executor, Kubectl::default())
            .with_sleeper(sleeper)
            .with_retry_callback(&NoCallback)
    }

    #[test]
    fn test_full_rollout_with_database() {
        let executor = with_pod(ScriptedExecutor::default());
        let sleeper = RecordingSleeper::default();
        let mut progress = RecordingProgress::default();

        let summary = rollout(&executor, &sleeper)
            .run(&plan(true), &mut progress)
            .unwrap();

        let lookup = format!(
            "kubectl get pods -l app=postgres --sort-by=.metadata.creationTimestamp -o template --template={}",
            crate::kubectl::POD_NAME_TEMPLATE
        );
        assert_eq!(
            executor.calls(),
            vec![
                "kubectl get nodes",
                "kubectl delete -f gen/dex-worker-rc.yaml",
                "kubectl delete -f gen/dex-worker-service.yaml",
                "kubectl delete -f gen/dex-overlord-rc.yaml",
                "kubectl delete -f gen/dex-overlord-service.yaml",
                "kubectl delete -f gen/postgres-rc.yaml",
                "kubectl delete -f gen/postgres-service.yaml",
                "kubectl create -f gen/postgres-rc.yaml",
                "kubectl create -f gen/postgres-service.yaml",
                lookup.as_str(),
                "kubectl exec postgres-abc12 -- psql -U postgres -c SELECT 1",
                "kubectl create -f gen/dex-overlord-rc.yaml",
                "kubectl create -f gen/dex-overlord-service.yaml",
                "kubectl create -f gen/dex-worker-rc.yaml",
                "kubectl create -f gen/dex-worker-service.yaml",
            ]
        );
        assert_eq!(summary.created.len(), 6);
        assert_eq!(summary.database_pod.as_deref(), Some("postgres-abc12"));
        assert_eq!(progress.pod.as_deref(), Some("postgres-abc12"));
        assert_eq!(
            progress.phases,
            vec![
                Phase::Probe,
                Phase::Teardown,
                Phase::CreateDatabase,
                Phase::CreateCoordinator,
                Phase::CreateWorkers,
                Phase::Done,
            ]
        );
        assert!(sleeper.0.borrow().is_empty());
    }

    #[test]
    fn test_creation_order_is_by_tier() {
        let executor = with_pod(ScriptedExecutor::default());
        let sleeper = RecordingSleeper::default();
        let mut progress = RecordingProgress::default();

        rollout(&executor, &sleeper)
            .run(&plan(true), &mut progress)
            .unwrap();

        let kinds: Vec<TierKind> = progress.created.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TierKind::Database,
                TierKind::Database,
                TierKind::Coordinator,
                TierKind::Coordinator,
                TierKind::Worker,
                TierKind::Worker,
            ]
        );
    }

    #[test]
    fn test_database_disabled_issues_no_database_commands() {
        let executor = ScriptedExecutor::default();
        let sleeper = RecordingSleeper::default();

        let summary = rollout(&executor, &sleeper)
            .run(&plan(false), &mut NoProgress)
            .unwrap();

        assert_eq!(executor.count("postgres"), 0);
        assert_eq!(executor.count("get pods"), 0);
        assert_eq!(executor.count("exec"), 0);
        assert_eq!(summary.database_pod, None);
        assert_eq!(summary.created.len(), 4);
    }

    #[test]
    fn test_teardown_failures_are_tolerated() {
        let executor = with_pod(ScriptedExecutor::default().on(
            "delete",
            vec![fail("Error from server (NotFound): replicationcontrollers not found")],
        ));
        let sleeper = RecordingSleeper::default();
        let mut progress = RecordingProgress::default();

        let summary = rollout(&executor, &sleeper)
            .run(&plan(true), &mut progress)
            .unwrap();

        assert_eq!(executor.count("delete"), 6);
        assert_eq!(summary.delete_failures.len(), 6);
        assert_eq!(progress.delete_failures, 6);
        assert_eq!(summary.created.len(), 6);
    }

    #[test]
    fn test_probe_succeeds_on_third_attempt() {
        let executor = ScriptedExecutor::default().on(
            "get nodes",
            vec![fail("refused"), fail("refused"), ok("NAME STATUS")],
        );
        let sleeper = RecordingSleeper::default();

        rollout(&executor, &sleeper)
            .run(&plan(false), &mut NoProgress)
            .unwrap();

        assert_eq!(executor.count("get nodes"), 3);
        assert_eq!(executor.position("delete"), Some(3));
        assert_eq!(*sleeper.0.borrow(), vec![Duration::from_secs(3); 2]);
    }

    #[test]
    fn test_probe_exhausted_is_fatal() {
        let executor = ScriptedExecutor::default().on("get nodes", vec![fail("refused")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Probe));
        assert_eq!(executor.calls().len(), 5);
        assert_eq!(executor.count("delete"), 0);
        assert_eq!(sleeper.0.borrow().len(), 4);
    }

    #[test]
    fn test_readiness_exhausted_aborts_before_coordinator() {
        let executor = with_pod(ScriptedExecutor::default())
            .on("exec", vec![fail("psql: could not connect to server")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::CreateDatabase));
        assert!(matches!(
            &err,
            Error::Step { source, .. } if matches!(**source, Error::RetryExhausted { attempts: 20, .. })
        ));
        assert_eq!(executor.count("exec"), 20);
        assert_eq!(executor.count("create -f gen/dex-"), 0);
        assert_eq!(*sleeper.0.borrow(), vec![Duration::from_secs(2); 19]);
    }

    #[test]
    fn test_readiness_tolerates_slow_database() {
        let executor = with_pod(ScriptedExecutor::default()).on(
            "exec",
            vec![fail("starting up"), fail("starting up"), ok("1")],
        );
        let sleeper = RecordingSleeper::default();

        rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap();

        assert_eq!(executor.count("exec"), 3);
        assert!(executor.position("exec") < executor.position("create -f gen/dex-overlord"));
    }

    #[test]
    fn test_missing_database_pod_is_fatal() {
        let executor = ScriptedExecutor::default().on("get pods", vec![ok("  \n")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::CreateDatabase));
        assert!(err.to_string().contains("app=postgres"));
        assert_eq!(executor.count("get pods"), 20);
        assert_eq!(sleeper.0.borrow().len(), 19);
        assert_eq!(executor.count("exec"), 0);
        assert_eq!(executor.count("create -f gen/dex-"), 0);
    }

    #[test]
    fn test_pod_lookup_waits_for_pod() {
        let executor = ScriptedExecutor::default()
            .on("get pods", vec![ok(""), ok("postgres-abc12\n")]);
        let sleeper = RecordingSleeper::default();

        let summary = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap();

        assert_eq!(executor.count("get pods"), 2);
        assert_eq!(*sleeper.0.borrow(), vec![Duration::from_secs(2)]);
        assert_eq!(summary.database_pod.as_deref(), Some("postgres-abc12"));
        assert_eq!(executor.count("exec postgres-abc12 --"), 1);
    }

    #[test]
    fn test_pod_lookup_picks_newest_pod() {
        let executor = ScriptedExecutor::default()
            .on("get pods", vec![ok("postgres-oldaa\npostgres-newbb\n")]);
        let sleeper = RecordingSleeper::default();

        let summary = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap();

        assert_eq!(summary.database_pod.as_deref(), Some("postgres-newbb"));
        assert_eq!(executor.count("exec postgres-newbb --"), 1);
        assert_eq!(executor.count("postgres-oldaa"), 0);
    }

    #[test]
    fn test_newest_pod() {
        assert_eq!(newest_pod("a\nb\n\n").as_deref(), Some("b"));
        assert_eq!(newest_pod(" only \n").as_deref(), Some("only"));
        assert_eq!(newest_pod(" \n"), None);
    }

    #[test]
    fn test_database_create_failure_is_fatal() {
        let executor = ScriptedExecutor::default()
            .on("create -f gen/postgres-rc.yaml", vec![fail("already exists")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::CreateDatabase));
        assert_eq!(err.command_output(), Some("already exists"));
        assert_eq!(executor.count("create -f gen/postgres-service.yaml"), 0);
        assert_eq!(executor.count("get pods"), 0);
    }

    #[test]
    fn test_coordinator_failure_stops_before_workers() {
        let executor = with_pod(ScriptedExecutor::default())
            .on("create -f gen/dex-overlord-service.yaml", vec![fail("invalid")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(true), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::CreateCoordinator));
        assert_eq!(executor.count("create -f gen/dex-overlord-rc.yaml"), 1);
        assert_eq!(executor.count("create -f gen/dex-worker"), 0);
        assert_eq!(
            executor.calls().last().map(String::as_str),
            Some("kubectl create -f gen/dex-overlord-service.yaml")
        );
    }

    #[test]
    fn test_worker_failure_is_fatal() {
        let executor = ScriptedExecutor::default()
            .on("create -f gen/dex-worker-rc.yaml", vec![fail("quota exceeded")]);
        let sleeper = RecordingSleeper::default();

        let err = rollout(&executor, &sleeper)
            .run(&plan(false), &mut NoProgress)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::CreateWorkers));
        assert_eq!(executor.count("create -f gen/dex-worker-service.yaml"), 0);
    }

    #[test]
    fn test_plan_commands_match_rollout() {
        let executor = with_pod(ScriptedExecutor::default());
        let sleeper = RecordingSleeper::default();
        let plan = plan(true);

        rollout(&executor, &sleeper)
            .run(&plan, &mut NoProgress)
            .unwrap();

        let listed: Vec<String> = plan
            .commands(&Kubectl::default())
            .into_iter()
            .map(|(_, inv)| inv.to_string().replace(POD_PLACEHOLDER, "postgres-abc12"))
            .collect();
        assert_eq!(listed, executor.calls());
    }

    #[test]
    fn test_plan_commands_without_database() {
        let commands = plan(false).commands(&Kubectl::default());
        assert_eq!(commands.len(), 1 + 4 + 4);
        assert!(commands.iter().all(|(phase, _)| *phase != Phase::CreateDatabase));
    }
}
