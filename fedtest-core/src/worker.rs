//! Orchestrator side of a role worker: one supervised child process per role.
//!
//! The supervisor:
//! 1. Launches the child with piped stdin/stdout (killed on drop)
//! 2. Writes the [`WorkerRequest`] JSON to stdin and closes it
//! 3. Scans stdout for the first line that parses as a [`RunResult`] and
//!    puts it on the case's [`ResultSender`]
//! 4. Waits for the child to exit, or kills and reaps it when the case's
//!    teardown token is cancelled
//!
//! A worker that exits without reporting leaves no result; the orchestrator
//! classifies that as an incomplete case.

use fedtest_types::{Role, RunResult, WorkerRequest};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::ResultSender;

/// Errors from building worker launchers.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Could not resolve the path of the running executable.
    #[error("cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),
}

/// Builds the child command for one role of one case.
///
/// Stdio is configured by the supervisor; implementations only choose the
/// program, arguments and environment.
pub trait WorkerLauncher: Send + Sync {
    /// Command that runs `request.role` for `request.case`.
    fn command(&self, request: &WorkerRequest) -> Command;
}

/// Launches a fixed program with fixed arguments for every role.
///
/// The role and case travel in the stdin request, so one binary serves
/// every role.
#[derive(Debug, Clone)]
pub struct ExecLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ExecLauncher {
    /// Launch `program args...` for each role.
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-execute the running binary with the `worker` subcommand.
    pub fn current_exe() -> Result<Self, WorkerError> {
        let program = std::env::current_exe().map_err(WorkerError::CurrentExe)?;
        Ok(Self::new(program, ["worker"]))
    }

    /// The program this launcher runs.
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl WorkerLauncher for ExecLauncher {
    fn command(&self, _request: &WorkerRequest) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The process was killed by the harness (deadline or interrupt).
    Terminated,
    /// The process could not be started.
    LaunchFailed(String),
    /// The process could not be waited on, or its supervisor died.
    Lost(String),
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited(status) => write!(f, "{}", status),
            WorkerExit::Terminated => write!(f, "terminated by harness"),
            WorkerExit::LaunchFailed(cause) => write!(f, "launch failed: {}", cause),
            WorkerExit::Lost(cause) => write!(f, "lost: {}", cause),
        }
    }
}

/// Final state of one supervised worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// The role the worker ran.
    pub role: Role,
    /// How the process ended.
    pub exit: WorkerExit,
    /// Whether a result line was seen on stdout.
    pub reported: bool,
}

/// A running, supervised role worker.
#[derive(Debug)]
pub struct RoleWorker {
    role: Role,
    supervisor: JoinHandle<WorkerReport>,
}

impl RoleWorker {
    /// Start a worker for `request.role` and supervise it on a tokio task.
    ///
    /// `teardown` is the case-scoped cancellation token: cancelling it kills
    /// the child. `grace` bounds how long the supervisor waits for the
    /// child's stdout to close after the process is gone.
    pub fn spawn(
        launcher: &dyn WorkerLauncher,
        request: WorkerRequest,
        results: ResultSender,
        teardown: CancellationToken,
        grace: Duration,
    ) -> Self {
        let role = request.role;
        let command = launcher.command(&request);
        let supervisor = tokio::spawn(supervise(command, request, results, teardown, grace));
        Self { role, supervisor }
    }

    /// The role this worker runs.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wait for the supervisor to finish.
    pub async fn join(self) -> WorkerReport {
        match self.supervisor.await {
            Ok(report) => report,
            Err(e) => WorkerReport {
                role: self.role,
                exit: WorkerExit::Lost(format!("supervisor failed: {}", e)),
                reported: false,
            },
        }
    }
}

async fn supervise(
    mut command: Command,
    request: WorkerRequest,
    results: ResultSender,
    teardown: CancellationToken,
    grace: Duration,
) -> WorkerReport {
    let role = request.role;
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let cause = format!("failed to launch worker: {}", e);
            tracing::error!(%role, "{}", cause);
            results.put(RunResult::failure(role, cause.clone()));
            return WorkerReport {
                role,
                exit: WorkerExit::LaunchFailed(cause),
                reported: true,
            };
        }
    };
    tracing::debug!(%role, pid = ?child.id(), "Worker started");

    if let Some(mut stdin) = child.stdin.take() {
        match serde_json::to_vec(&request) {
            Ok(payload) => {
                // Written off the supervisor path so a child that never reads
                // stdin cannot stall cancellation.
                tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(&payload).await {
                        tracing::debug!(%role, "Worker stdin closed early: {}", e);
                    }
                    let _ = stdin.shutdown().await;
                });
            }
            Err(e) => tracing::error!(%role, "Cannot encode worker request: {}", e),
        }
    }

    let mut reader = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(read_result(role, stdout, results)));

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => WorkerExit::Exited(status),
            Err(e) => WorkerExit::Lost(e.to_string()),
        },
        _ = teardown.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!(%role, "Failed to kill worker: {}", e);
            }
            tracing::info!(%role, "Worker terminated");
            WorkerExit::Terminated
        }
    };

    let reported = match reader.as_mut() {
        Some(handle) => match tokio::time::timeout(grace, &mut *handle).await {
            Ok(Ok(reported)) => reported,
            Ok(Err(e)) => {
                tracing::warn!(%role, "Result reader failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(%role, "Worker stdout still open {:?} after exit", grace);
                handle.abort();
                false
            }
        },
        None => false,
    };

    WorkerReport {
        role,
        exit,
        reported,
    }
}

/// Scan worker stdout; put the first parseable result on the channel.
async fn read_result(role: Role, stdout: ChildStdout, results: ResultSender) -> bool {
    let mut lines = BufReader::new(stdout).lines();
    let mut reported = false;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !reported {
                    if let Ok(result) = RunResult::from_json_line(&line) {
                        if result.role != role {
                            tracing::warn!(
                                %role,
                                reported_role = %result.role,
                                "Worker reported a result for another role"
                            );
                        }
                        results.put(result);
                        reported = true;
                        continue;
                    }
                }
                tracing::debug!(%role, "worker: {}", line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%role, "Failed reading worker stdout: {}", e);
                break;
            }
        }
    }

    reported
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::channel::ResultChannel;
    use crate::test_support::{request, ScriptLauncher};
    use fedtest_types::RoleOutput;

    const GRACE: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn reports_result_line_and_exit() {
        let launcher = ScriptLauncher::new().role(
            Role::Guest,
            r#"cat >/dev/null; echo "noise"; echo '{"role":"guest","outcome":{"status":"success","output":{"kind":"acknowledged"}}}'"#,
        );
        let mut channel = ResultChannel::new();
        let worker = RoleWorker::spawn(
            &launcher,
            request(Role::Guest),
            channel.sender(),
            CancellationToken::new(),
            GRACE,
        );
        let report = worker.join().await;

        assert!(report.reported);
        assert!(matches!(report.exit, WorkerExit::Exited(status) if status.success()));
        let results = channel.drain();
        assert_eq!(
            results,
            vec![RunResult::success(Role::Guest, RoleOutput::Acknowledged)]
        );
    }

    #[tokio::test]
    async fn worker_receives_request_on_stdin() {
        // Echo the role back out of the request JSON.
        let launcher = ScriptLauncher::new().role(
            Role::Host,
            r#"read req; case "$req" in *'"role":"host"'*) echo '{"role":"host","outcome":{"status":"success","output":{"kind":"acknowledged"}}}';; esac"#,
        );
        let mut channel = ResultChannel::new();
        let report = RoleWorker::spawn(
            &launcher,
            request(Role::Host),
            channel.sender(),
            CancellationToken::new(),
            GRACE,
        )
        .join()
        .await;
        assert!(report.reported);
        assert_eq!(channel.drain().len(), 1);
    }

    #[tokio::test]
    async fn exit_without_result_is_unreported() {
        let launcher = ScriptLauncher::new().role(Role::Guest, "exit 3");
        let mut channel = ResultChannel::new();
        let report = RoleWorker::spawn(
            &launcher,
            request(Role::Guest),
            channel.sender(),
            CancellationToken::new(),
            GRACE,
        )
        .join()
        .await;

        assert!(!report.reported);
        assert!(matches!(report.exit, WorkerExit::Exited(status) if status.code() == Some(3)));
        assert!(channel.drain().is_empty());
    }

    #[tokio::test]
    async fn teardown_kills_running_worker() {
        let launcher = ScriptLauncher::new().role(Role::Guest, "exec sleep 30");
        let channel = ResultChannel::new();
        let teardown = CancellationToken::new();
        let worker = RoleWorker::spawn(
            &launcher,
            request(Role::Guest),
            channel.sender(),
            teardown.clone(),
            GRACE,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        teardown.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), worker.join())
            .await
            .expect("terminated worker should be reaped promptly");
        assert_eq!(report.exit, WorkerExit::Terminated);
        assert!(!report.reported);
    }

    #[tokio::test]
    async fn launch_failure_becomes_failure_result() {
        let launcher = ExecLauncher::new("/nonexistent/fedtest-worker", ["worker"]);
        let mut channel = ResultChannel::new();
        let report = RoleWorker::spawn(
            &launcher,
            request(Role::Guest),
            channel.sender(),
            CancellationToken::new(),
            GRACE,
        )
        .join()
        .await;

        assert!(matches!(report.exit, WorkerExit::LaunchFailed(_)));
        let results = channel.drain();
        assert_eq!(results.len(), 1);
        assert!(results[0]
            .failure_cause()
            .unwrap()
            .contains("failed to launch worker"));
    }
}
