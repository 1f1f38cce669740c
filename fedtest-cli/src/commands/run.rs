//! Automatic mode: every role of every case in its own process.

use anyhow::{Context, Result};
use fedtest_core::{CaseOrchestrator, CaseOutcome, CaseSuiteRunner, ExecLauncher, SuiteOptions, SuiteReport};
use fedtest_types::TestCase;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use super::{check_filter, exit_code, load_suite};

/// Run the run command.
pub async fn run(
    config_path: &Path,
    cases: Vec<String>,
    repeat: usize,
    keep_artifacts: bool,
) -> Result<ExitCode> {
    let (config, suite) = load_suite(config_path)?;
    check_filter(&suite, &cases)?;

    let launcher = ExecLauncher::current_exe().context("Failed to locate worker binary")?;
    let orchestrator = CaseOrchestrator::new(launcher, config.settings());

    let interrupt = CancellationToken::new();
    let watcher = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("User interrupt, stopping suite");
            watcher.cancel();
        }
    });

    let runner = CaseSuiteRunner::new(orchestrator, interrupt);
    let report = runner.run(&suite, &SuiteOptions { cases, repeat }).await;

    tracing::debug!(counts = ?report.counts(), "Suite outcome counts");
    print_summary(&report);
    if !keep_artifacts {
        clean_passed(&suite, &report).await;
    }
    Ok(exit_code(report.all_passed(), report.interrupted))
}

/// Remove federation and model files of passed cases; failed ones stay for
/// inspection.
async fn clean_passed(suite: &[TestCase], report: &SuiteReport) {
    for case_report in report.reports.iter().filter(|r| r.outcome.is_passed()) {
        let Some(case) = suite.iter().find(|c| c.name() == case_report.case) else {
            continue;
        };
        if let Err(e) = fedtest_protocol::remove_case_artifacts(case, &case_report.job_suffix).await {
            tracing::warn!(case = case.name(), "Failed to remove run artifacts: {}", e);
        }
    }
}

fn print_summary(report: &SuiteReport) {
    for case in &report.reports {
        match &case.outcome {
            CaseOutcome::Passed => {
                println!("PASS {} ({:.2}s)", case.case, case.elapsed.as_secs_f64());
            }
            outcome => println!("FAIL {}: {}", case.case, outcome),
        }
    }

    let passed = report.reports.iter().filter(|r| r.outcome.is_passed()).count();
    println!("---");
    println!(
        "{} cases: {} passed, {} failed{}",
        report.reports.len(),
        passed,
        report.reports.len() - passed,
        if report.interrupted { " (interrupted)" } else { "" }
    );
}
