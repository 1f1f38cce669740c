//! Shell-script workers for supervisor and orchestrator tests.

use fedtest_types::{Role, RoleOutput, RunResult, WorkerRequest};
use std::collections::HashMap;
use tokio::process::Command;

use crate::worker::WorkerLauncher;

/// Runs `sh -c <script>` per role; roles without a script exit 0 silently.
#[derive(Debug, Default, Clone)]
pub struct ScriptLauncher {
    scripts: HashMap<Role, String>,
}

impl ScriptLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role, script: &str) -> Self {
        self.scripts.insert(role, script.to_string());
        self
    }
}

impl WorkerLauncher for ScriptLauncher {
    fn command(&self, request: &WorkerRequest) -> Command {
        let script = self
            .scripts
            .get(&request.role)
            .map(String::as_str)
            .unwrap_or("exit 0");
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }
}

pub fn request(role: Role) -> WorkerRequest {
    WorkerRequest {
        case: "test".to_string(),
        role,
        job_suffix: "-test-0".to_string(),
        input: serde_json::json!({}),
        max_rows: 100,
    }
}

fn echo(result: &RunResult) -> String {
    // Result JSON never contains single quotes for these fixtures.
    let line = result.to_json_line().unwrap_or_default();
    format!("echo '{}'", line)
}

/// Shell command printing an aligned single-column result.
pub fn aligned_line(role: Role, ids: &[&str]) -> String {
    echo(&RunResult::success(
        role,
        RoleOutput::Aligned {
            columns: vec![ids.iter().map(|s| s.to_string()).collect()],
        },
    ))
}

/// Shell command printing a failure result.
pub fn failure_line(role: Role, cause: &str) -> String {
    echo(&RunResult::failure(role, cause))
}

/// Shell command printing an acknowledged result.
pub fn ack(role: Role) -> String {
    echo(&RunResult::success(role, RoleOutput::Acknowledged))
}
