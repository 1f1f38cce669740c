//! Sequential suite runner.
//!
//! Cases run one after another. Each gets a fresh orchestrator run, so no
//! state crosses case boundaries. An operator interrupt aborts the case in
//! flight and skips the rest.

use fedtest_types::TestCase;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{CaseOrchestrator, CaseOutcome, CaseReport};
use crate::worker::WorkerLauncher;

/// Which cases to run and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteOptions {
    /// Case names to run; empty means all.
    pub cases: Vec<String>,
    /// Number of passes over the selected cases.
    pub repeat: usize,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            cases: Vec::new(),
            repeat: 1,
        }
    }
}

impl SuiteOptions {
    fn selects(&self, case: &TestCase) -> bool {
        self.cases.is_empty() || self.cases.iter().any(|name| name == case.name())
    }
}

/// Reports of every case that ran.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    /// Case reports in execution order.
    pub reports: Vec<CaseReport>,
    /// True if the operator interrupted the run.
    pub interrupted: bool,
}

impl SuiteReport {
    /// True if at least one case ran and every case passed.
    pub fn all_passed(&self) -> bool {
        !self.interrupted
            && !self.reports.is_empty()
            && self.reports.iter().all(|r| r.outcome.is_passed())
    }

    /// Number of cases per outcome kind.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for report in &self.reports {
            *counts.entry(report.outcome.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Reports of cases that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.reports.iter().filter(|r| !r.outcome.is_passed())
    }
}

/// Runs a list of cases through one orchestrator.
#[derive(Debug)]
pub struct CaseSuiteRunner<L> {
    orchestrator: CaseOrchestrator<L>,
    interrupt: CancellationToken,
}

impl<L: WorkerLauncher> CaseSuiteRunner<L> {
    /// Create a runner; cancelling `interrupt` stops the suite.
    pub fn new(orchestrator: CaseOrchestrator<L>, interrupt: CancellationToken) -> Self {
        Self {
            orchestrator,
            interrupt,
        }
    }

    /// Run the selected cases `options.repeat` times, in order.
    pub async fn run(&self, cases: &[TestCase], options: &SuiteOptions) -> SuiteReport {
        let selected: Vec<&TestCase> = cases.iter().filter(|c| options.selects(c)).collect();
        tracing::info!(
            cases = selected.len(),
            repeat = options.repeat,
            "Suite started"
        );

        let mut suite = SuiteReport::default();
        'passes: for pass in 0..options.repeat.max(1) {
            for case in &selected {
                if self.interrupt.is_cancelled() {
                    suite.interrupted = true;
                    break 'passes;
                }
                tracing::debug!(case = case.name(), pass, "Running case");
                let report = self.orchestrator.run(case, &self.interrupt).await;
                let interrupted = report.outcome == CaseOutcome::OperatorInterrupt;
                suite.reports.push(report);
                if interrupted {
                    suite.interrupted = true;
                    break 'passes;
                }
            }
        }

        tracing::info!(
            ran = suite.reports.len(),
            passed = suite.reports.iter().filter(|r| r.outcome.is_passed()).count(),
            interrupted = suite.interrupted,
            "Suite finished"
        );
        suite
    }
}
