//! CLI command implementations.

pub mod role;
pub mod run;
pub mod worker;

use anyhow::{bail, Context, Result};
use fedtest_core::Config;
use fedtest_types::TestCase;
use std::path::Path;
use std::process::ExitCode;

/// Exit code after an operator interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Load and validate the suite file.
pub fn load_suite(path: &Path) -> Result<(Config, Vec<TestCase>)> {
    let config = Config::from_file(path).context("Failed to load suite")?;
    let cases = config.test_cases().context("Invalid suite")?;
    for case in &cases {
        fedtest_protocol::check_case(case).context("Invalid suite")?;
    }
    Ok((config, cases))
}

/// Fail if `names` mentions a case the suite does not define.
pub fn check_filter(cases: &[TestCase], names: &[String]) -> Result<()> {
    for name in names {
        if !cases.iter().any(|c| c.name() == name) {
            bail!("No case named {:?} in the suite", name);
        }
    }
    Ok(())
}

/// Map a run's result onto the process exit code.
pub fn exit_code(passed: bool, interrupted: bool) -> ExitCode {
    if interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
