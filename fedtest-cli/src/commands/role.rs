//! Manual mode: one role's side of every case, run in this process.
//!
//! Start one terminal per role with the same `--session` tag; the tag and the
//! case name form the federation job suffix, so the terminals meet.

use anyhow::Result;
use fedtest_core::agreement;
use fedtest_protocol::{run_role, LocalBackend};
use fedtest_types::{manual_job_suffix, Role, RunResult, TestCase, WorkerRequest};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;

use super::{check_filter, exit_code, load_suite};

/// Run the role command.
pub async fn run(config_path: &Path, role: Role, session: Option<&str>, only: &[String]) -> Result<ExitCode> {
    let (config, suite) = load_suite(config_path)?;
    check_filter(&suite, only)?;
    let settings = config.settings();
    let backend = LocalBackend::new();

    let mut ran = 0usize;
    let mut failed = 0usize;
    for case in &suite {
        if !only.is_empty() && !only.iter().any(|n| n == case.name()) {
            continue;
        }
        let Some(spec) = case.role(role) else {
            tracing::debug!(case = case.name(), %role, "Case has no such role, skipping");
            continue;
        };

        let request = WorkerRequest {
            case: case.name().to_string(),
            role,
            job_suffix: manual_job_suffix(case.name(), session),
            input: spec.input.clone(),
            max_rows: settings.max_rows,
        };
        let timeout = spec.timeout.unwrap_or(settings.default_timeout);
        tracing::info!(case = case.name(), %role, job_suffix = %request.job_suffix, "Running role");

        let result = tokio::select! {
            result = tokio::time::timeout(timeout, run_role(&request, &backend)) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("User interrupt");
                println!("INTERRUPTED {}", case.name());
                return Ok(exit_code(false, true));
            }
        };
        ran += 1;

        let verdict = match result {
            Err(_) => Err(format!("timed out after {:?}", timeout)),
            Ok(result) => judge(case, result),
        };
        match verdict {
            Ok(()) => println!("PASS {} [{}]", case.name(), role),
            Err(reason) => {
                failed += 1;
                println!("FAIL {} [{}]: {}", case.name(), role, reason);
            }
        }
    }

    println!("---");
    println!("{} cases as {}: {} passed, {} failed", ran, role, ran - failed, failed);
    Ok(exit_code(ran > 0 && failed == 0, false))
}

/// Checks one role can make on its own: success, reload and expectation.
fn judge(case: &TestCase, result: RunResult) -> std::result::Result<(), String> {
    if let Some(cause) = result.failure_cause() {
        return Err(format!("role failure: {}", cause));
    }
    let mut results = BTreeMap::new();
    results.insert(result.role, result);
    agreement::check_reload(&results)
        .and_then(|()| agreement::check_expectations(&only_this_role(case, &results), &results))
        .map_err(|m| m.to_string())
}

/// The case restricted to the roles that reported here.
fn only_this_role(case: &TestCase, results: &BTreeMap<Role, RunResult>) -> TestCase {
    results
        .keys()
        .filter_map(|role| case.role(*role).cloned())
        .fold(TestCase::new(case.name()), |c, spec| c.with_role(spec))
}
