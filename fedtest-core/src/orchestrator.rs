//! Case orchestrator: run every role of one case and judge the outcome.
//!
//! One call to [`CaseOrchestrator::run`] owns a fresh [`ResultChannel`], a
//! fresh case-scoped teardown token and a single [`DeadlineGuard`]. None of
//! them outlive the call, so back-to-back cases cannot see each other's
//! results or timers.

use fedtest_types::{job_suffix, Role, RunResult, TestCase, WorkerRequest};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::process::ExitStatus;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

use crate::agreement::{self, Mismatch};
use crate::channel::ResultChannel;
use crate::deadline::{DeadlineGuard, Disarm};
use crate::worker::{RoleWorker, WorkerExit, WorkerLauncher, WorkerReport};

/// Suite-wide knobs the orchestrator applies to every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Timeout for roles that do not set their own.
    pub default_timeout: Duration,
    /// Row cap passed to every worker's dataset loader.
    pub max_rows: usize,
    /// How long to wait for a worker's stdout after its process is gone.
    pub termination_grace: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            max_rows: 200_000,
            termination_grace: Duration::from_secs(5),
        }
    }
}

/// Final classification of a case run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    /// Every role reported and every agreement check held.
    Passed,
    /// Outputs disagreed.
    Mismatch(Mismatch),
    /// The case deadline fired; every worker was terminated.
    TimedOut {
        /// The deadline that expired.
        after: Duration,
    },
    /// Some roles exited without reporting a result.
    Incomplete {
        /// Roles with no result.
        missing: Vec<Role>,
    },
    /// Some roles reported an internal failure.
    RoleFailure {
        /// Failing roles and their causes.
        failures: Vec<(Role, String)>,
    },
    /// The operator cancelled the run; every worker was terminated.
    OperatorInterrupt,
}

impl CaseOutcome {
    /// Returns true only for [`CaseOutcome::Passed`].
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }

    /// Short outcome name for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            CaseOutcome::Passed => "passed",
            CaseOutcome::Mismatch(_) => "mismatch",
            CaseOutcome::TimedOut { .. } => "timed_out",
            CaseOutcome::Incomplete { .. } => "incomplete",
            CaseOutcome::RoleFailure { .. } => "role_failure",
            CaseOutcome::OperatorInterrupt => "operator_interrupt",
        }
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Passed => write!(f, "passed"),
            CaseOutcome::Mismatch(m) => write!(f, "{}", m),
            CaseOutcome::TimedOut { after } => write!(f, "timed out after {:?}", after),
            CaseOutcome::Incomplete { missing } => {
                let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                write!(f, "incomplete: no result from {}", names.join(", "))
            }
            CaseOutcome::RoleFailure { failures } => {
                write!(f, "role failure:")?;
                for (role, cause) in failures {
                    write!(f, " [{}: {}]", role, cause)?;
                }
                Ok(())
            }
            CaseOutcome::OperatorInterrupt => write!(f, "interrupted by operator"),
        }
    }
}

/// Everything observed about one case run.
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Case identifier.
    pub case: String,
    /// Suffix appended to every federation job id of this run.
    pub job_suffix: String,
    /// Final classification.
    pub outcome: CaseOutcome,
    /// Results drained from the channel, sorted by role.
    pub results: Vec<RunResult>,
    /// How each worker process ended.
    pub workers: Vec<WorkerReport>,
    /// Wall-clock time from first spawn to judgement.
    pub elapsed: Duration,
}

impl CaseReport {
    /// The result reported by `role`, if any.
    pub fn result(&self, role: Role) -> Option<&RunResult> {
        self.results.iter().find(|r| r.role == role)
    }
}

/// Runs one case at a time with a given launcher.
#[derive(Debug)]
pub struct CaseOrchestrator<L> {
    launcher: L,
    settings: OrchestratorSettings,
}

impl<L: WorkerLauncher> CaseOrchestrator<L> {
    /// Create an orchestrator.
    pub fn new(launcher: L, settings: OrchestratorSettings) -> Self {
        Self { launcher, settings }
    }

    /// The settings applied to every case.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run every role of `case` concurrently and judge the outcome.
    ///
    /// Cancelling `interrupt` terminates every worker of this case and yields
    /// [`CaseOutcome::OperatorInterrupt`].
    pub async fn run(&self, case: &TestCase, interrupt: &CancellationToken) -> CaseReport {
        let started = Instant::now();
        let timeout = case.timeout(self.settings.default_timeout);
        let suffix = job_suffix(case.name(), SystemTime::now());
        tracing::info!(case = case.name(), roles = case.len(), ?timeout, "Case started");

        let mut channel = ResultChannel::new();
        let teardown = CancellationToken::new();

        let workers: Vec<RoleWorker> = case
            .roles()
            .map(|spec| {
                let request = WorkerRequest {
                    case: case.name().to_string(),
                    role: spec.role,
                    job_suffix: suffix.clone(),
                    input: spec.input.clone(),
                    max_rows: self.settings.max_rows,
                };
                RoleWorker::spawn(
                    &self.launcher,
                    request,
                    channel.sender(),
                    teardown.clone(),
                    self.settings.termination_grace,
                )
            })
            .collect();

        let expire = teardown.clone();
        let mut deadline = DeadlineGuard::armed(timeout, move || expire.cancel());

        let joined = join_all(workers.into_iter().map(RoleWorker::join));
        tokio::pin!(joined);
        let (workers, interrupted) = tokio::select! {
            reports = &mut joined => (reports, false),
            _ = interrupt.cancelled() => {
                tracing::warn!(case = case.name(), "Operator interrupt, terminating all roles");
                teardown.cancel();
                (joined.await, true)
            }
        };

        // Ctrl+C also reaches the workers' process group, so they may exit
        // before the interrupt branch is taken, or before the token is
        // cancelled at all.
        let interrupted =
            interrupted || interrupt.is_cancelled() || interrupted_by_signal(&workers);
        let timed_out = deadline.disarm() == Disarm::AlreadyExpired;
        let mut results = channel.drain();
        results.sort_by_key(|r| r.role);

        let outcome = if interrupted {
            CaseOutcome::OperatorInterrupt
        } else if timed_out {
            CaseOutcome::TimedOut { after: timeout }
        } else {
            judge(case, &results, &workers)
        };

        let elapsed = started.elapsed();
        match &outcome {
            CaseOutcome::Passed => {
                tracing::info!(case = case.name(), ?elapsed, "Case passed");
            }
            CaseOutcome::Mismatch(m) => {
                tracing::error!(
                    case = case.name(),
                    check = %m.kind,
                    role = %m.role,
                    expected = %m.expected,
                    actual = %m.actual,
                    "Case failed: outputs disagree"
                );
            }
            other => {
                tracing::error!(case = case.name(), outcome = other.kind(), ?elapsed, "Case failed: {}", other);
            }
        }

        CaseReport {
            case: case.name().to_string(),
            job_suffix: suffix,
            outcome,
            results,
            workers,
            elapsed,
        }
    }
}

/// True if a worker died of SIGINT before reporting.
fn interrupted_by_signal(workers: &[WorkerReport]) -> bool {
    workers.iter().any(|w| {
        !w.reported && matches!(&w.exit, WorkerExit::Exited(status) if exited_on_sigint(status))
    })
}

#[cfg(unix)]
fn exited_on_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(2)
}

#[cfg(not(unix))]
fn exited_on_sigint(_status: &ExitStatus) -> bool {
    false
}

/// Classify a case whose workers all finished before the deadline.
fn judge(case: &TestCase, results: &[RunResult], workers: &[WorkerReport]) -> CaseOutcome {
    let mut by_role: BTreeMap<Role, RunResult> = BTreeMap::new();
    for result in results {
        if case.role(result.role).is_none() {
            tracing::warn!(case = case.name(), role = %result.role, "Ignoring result from a role outside the case");
            continue;
        }
        if by_role.contains_key(&result.role) {
            tracing::warn!(case = case.name(), role = %result.role, "Ignoring duplicate result");
            continue;
        }
        by_role.insert(result.role, result.clone());
    }

    let missing: Vec<Role> = case
        .role_names()
        .filter(|role| !by_role.contains_key(role))
        .collect();
    if !missing.is_empty() {
        for worker in workers.iter().filter(|w| missing.contains(&w.role)) {
            tracing::warn!(case = case.name(), role = %worker.role, exit = %worker.exit, "Worker ended without a result");
        }
        return CaseOutcome::Incomplete { missing };
    }

    let failures: Vec<(Role, String)> = by_role
        .values()
        .filter_map(|r| r.failure_cause().map(|cause| (r.role, cause.to_string())))
        .collect();
    if !failures.is_empty() {
        return CaseOutcome::RoleFailure { failures };
    }

    match agreement::check_case(case, &by_role) {
        Ok(()) => CaseOutcome::Passed,
        Err(mismatch) => CaseOutcome::Mismatch(mismatch),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::agreement::MismatchKind;
    use crate::test_support::{ack, aligned_line, failure_line, ScriptLauncher};
    use fedtest_types::{RoleOutput, RoleSpec};
    use serde_json::json;

    fn two_party_case(name: &str, timeout: Duration) -> TestCase {
        TestCase::new(name)
            .with_role(RoleSpec::new(Role::Guest, json!({})).with_timeout(timeout))
            .with_role(RoleSpec::new(Role::Host, json!({})).with_timeout(timeout))
    }

    fn orchestrator(launcher: ScriptLauncher) -> CaseOrchestrator<ScriptLauncher> {
        CaseOrchestrator::new(
            launcher,
            OrchestratorSettings {
                default_timeout: Duration::from_secs(10),
                max_rows: 100,
                termination_grace: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn agreeing_roles_pass() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1", "333"]))
            .role(Role::Host, &aligned_line(Role::Host, &["333", "1"]));
        let case = two_party_case("agree", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(report.outcome, CaseOutcome::Passed);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].role, Role::Guest);
        assert!(report.result(Role::Host).is_some());
    }

    #[tokio::test]
    async fn disagreeing_roles_mismatch() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1", "333"]))
            .role(Role::Host, &aligned_line(Role::Host, &["1", "22"]));
        let case = two_party_case("disagree", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        match report.outcome {
            CaseOutcome::Mismatch(m) => {
                assert_eq!(m.kind, MismatchKind::CrossRole);
                assert_eq!(m.role, Role::Host);
                assert_eq!(m.reference_role, Some(Role::Guest));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn host_without_alignment_mismatches() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1", "333"]))
            .role(Role::Host, &ack(Role::Host));
        let case = two_party_case("unaligned", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        match report.outcome {
            CaseOutcome::Mismatch(m) => {
                assert_eq!(m.kind, MismatchKind::CrossRole);
                assert_eq!(m.role, Role::Host);
                assert_eq!(m.actual, "acknowledged");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_killed_by_sigint_counts_as_interrupt() {
        // The token is never cancelled: the terminal's SIGINT beat the watcher.
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, "kill -INT $$");
        let case = two_party_case("sigint", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(report.outcome, CaseOutcome::OperatorInterrupt);
    }

    #[tokio::test]
    async fn expectation_mismatch_even_when_roles_agree() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, &aligned_line(Role::Host, &["1"]));
        let case = TestCase::new("expect")
            .with_role(RoleSpec::new(Role::Guest, json!({})).with_expectation(RoleOutput::Aligned {
                columns: vec![vec!["1".into(), "333".into()]],
            }))
            .with_role(RoleSpec::new(Role::Host, json!({})));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert!(matches!(
            report.outcome,
            CaseOutcome::Mismatch(Mismatch { kind: MismatchKind::Expectation, .. })
        ));
    }

    #[tokio::test]
    async fn silent_exit_is_incomplete() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, "exit 0");
        let case = two_party_case("silent", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(
            report.outcome,
            CaseOutcome::Incomplete {
                missing: vec![Role::Host]
            }
        );
    }

    #[tokio::test]
    async fn crash_is_incomplete() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, "kill -9 $$");
        let case = two_party_case("crash", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(
            report.outcome,
            CaseOutcome::Incomplete {
                missing: vec![Role::Host]
            }
        );
    }

    #[tokio::test]
    async fn reported_failure_is_role_failure() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, &failure_line(Role::Host, "unsupported method"));
        let case = two_party_case("fail", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(
            report.outcome,
            CaseOutcome::RoleFailure {
                failures: vec![(Role::Host, "unsupported method".to_string())]
            }
        );
    }

    #[tokio::test]
    async fn deadline_terminates_every_worker() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, "exec sleep 30")
            .role(Role::Host, "exec sleep 30")
            .role(Role::Coordinator, &ack(Role::Coordinator));
        let case = two_party_case("slow", Duration::from_millis(500))
            .with_role(RoleSpec::new(Role::Coordinator, json!({})).with_timeout(Duration::from_millis(300)));

        let started = Instant::now();
        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert_eq!(
            report.outcome,
            CaseOutcome::TimedOut {
                after: Duration::from_millis(500)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(5));

        // The coordinator finished on its own; everyone else was killed.
        for worker in &report.workers {
            match worker.role {
                Role::Coordinator => assert!(worker.reported),
                _ => assert_eq!(worker.exit, crate::worker::WorkerExit::Terminated),
            }
        }
    }

    #[tokio::test]
    async fn one_slow_role_times_out_the_whole_case() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, &aligned_line(Role::Guest, &["1"]))
            .role(Role::Host, "exec sleep 30");
        let case = two_party_case("straggler", Duration::from_millis(400));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        assert!(matches!(report.outcome, CaseOutcome::TimedOut { .. }));
        // The guest's result was already on the channel; it is kept but does
        // not rescue the case.
        assert!(report.result(Role::Guest).is_some());
    }

    #[tokio::test]
    async fn interrupt_terminates_and_reports() {
        let launcher = ScriptLauncher::new()
            .role(Role::Guest, "exec sleep 30")
            .role(Role::Host, "exec sleep 30");
        let case = two_party_case("interrupt", Duration::from_secs(30));
        let interrupt = CancellationToken::new();

        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let report = orchestrator(launcher).run(&case, &interrupt).await;
        assert_eq!(report.outcome, CaseOutcome::OperatorInterrupt);
        assert!(report.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn back_to_back_cases_do_not_share_timers() {
        let orchestrator = orchestrator(
            ScriptLauncher::new()
                .role(Role::Guest, &format!("sleep 1; {}", aligned_line(Role::Guest, &["1"])))
                .role(Role::Host, &format!("sleep 1; {}", aligned_line(Role::Host, &["1"]))),
        );

        let first = two_party_case("first", Duration::from_millis(200));
        let second = two_party_case("second", Duration::from_secs(5));
        let third = two_party_case("third", Duration::from_secs(5));

        let interrupt = CancellationToken::new();
        let a = orchestrator.run(&first, &interrupt).await;
        let b = orchestrator.run(&second, &interrupt).await;
        let c = orchestrator.run(&third, &interrupt).await;
        assert!(matches!(a.outcome, CaseOutcome::TimedOut { .. }));
        assert_eq!(b.outcome, CaseOutcome::Passed);
        assert_eq!(c.outcome, CaseOutcome::Passed);
        assert!(b.results.iter().all(|r| r.failure_cause().is_none()));
    }

    #[tokio::test]
    async fn stray_and_duplicate_results_are_ignored() {
        let launcher = ScriptLauncher::new()
            .role(
                Role::Guest,
                &format!(
                    "{}; {}",
                    aligned_line(Role::Guest, &["1"]),
                    aligned_line(Role::Guest, &["2"])
                ),
            )
            .role(Role::Host, &aligned_line(Role::Host, &["1"]));
        let case = two_party_case("dupes", Duration::from_secs(10));

        let report = orchestrator(launcher).run(&case, &CancellationToken::new()).await;
        // The reader keeps only the first result line per worker.
        assert_eq!(report.outcome, CaseOutcome::Passed);
        assert_eq!(report.results.len(), 2);
    }
}
