//! Agreement checks over the results of one case.
//!
//! Pure functions: they take the case definition and the role-keyed results
//! and return the first disagreement found. Three call sites, one failure
//! kind:
//! - cross-role: every aligned output equals the lowest-ordered role's
//! - reload: a selection role's trained and reloaded predictions are equal
//! - expectation: a role's output equals the case's known-good value

use fedtest_types::{Role, RoleOutput, RunResult, TestCase};
use std::collections::BTreeMap;
use std::fmt;

/// Which check found the disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    /// Two roles expected to converge produced different outputs.
    CrossRole,
    /// Reloaded-model prediction differs from the trained prediction.
    Reload,
    /// A role's output differs from its configured expectation.
    Expectation,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::CrossRole => write!(f, "cross-role"),
            MismatchKind::Reload => write!(f, "reload"),
            MismatchKind::Expectation => write!(f, "expectation"),
        }
    }
}

/// A disagreement, with both rendered values for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Which check failed.
    pub kind: MismatchKind,
    /// The role whose output failed the check.
    pub role: Role,
    /// For cross-role checks, the role used as reference.
    pub reference_role: Option<Role>,
    /// The reference value.
    pub expected: String,
    /// The disagreeing value.
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reference_role {
            Some(reference) => write!(
                f,
                "{} mismatch: {} has {} but {} has {}",
                self.kind, self.role, self.actual, reference, self.expected
            ),
            None => write!(
                f,
                "{} mismatch on {}: expected {}, got {}",
                self.kind, self.role, self.expected, self.actual
            ),
        }
    }
}

/// Run every check; return the first disagreement.
pub fn check_case(case: &TestCase, results: &BTreeMap<Role, RunResult>) -> Result<(), Mismatch> {
    check_cross_role(results)?;
    check_reload(results)?;
    check_expectations(case, results)
}

/// Every aligned output must agree with the first aligned output in role order.
///
/// Once any data-holding role reports an alignment, every data-holding role
/// must report one. Only the coordinator may stay without a comparable value.
pub fn check_cross_role(results: &BTreeMap<Role, RunResult>) -> Result<(), Mismatch> {
    let reference = results.iter().find_map(|(role, result)| match result.output() {
        Some(output @ RoleOutput::Aligned { .. }) if role.holds_data() => Some((*role, output)),
        _ => None,
    });
    let Some((reference_role, reference)) = reference else {
        return Ok(());
    };

    for (role, result) in results.iter().filter(|(role, _)| role.holds_data()) {
        if *role == reference_role {
            continue;
        }
        let output = result.output();
        if !output.map(|o| o.agrees_with(reference)).unwrap_or(false) {
            return Err(Mismatch {
                kind: MismatchKind::CrossRole,
                role: *role,
                reference_role: Some(reference_role),
                expected: reference.to_string(),
                actual: output
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "nothing".to_string()),
            });
        }
    }
    Ok(())
}

/// Every selection output's reloaded prediction must equal its trained one.
pub fn check_reload(results: &BTreeMap<Role, RunResult>) -> Result<(), Mismatch> {
    for (role, result) in results {
        if let Some(RoleOutput::Selected { trained, reloaded }) = result.output() {
            if trained != reloaded {
                return Err(Mismatch {
                    kind: MismatchKind::Reload,
                    role: *role,
                    reference_role: None,
                    expected: trained.to_string(),
                    actual: reloaded.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Every role with a configured expectation must produce an agreeing output.
pub fn check_expectations(
    case: &TestCase,
    results: &BTreeMap<Role, RunResult>,
) -> Result<(), Mismatch> {
    for spec in case.roles() {
        let Some(expected) = &spec.expect else {
            continue;
        };
        let actual = results.get(&spec.role).and_then(RunResult::output);
        let agrees = actual.map(|a| a.agrees_with(expected)).unwrap_or(false);
        if !agrees {
            return Err(Mismatch {
                kind: MismatchKind::Expectation,
                role: spec.role,
                reference_role: None,
                expected: expected.to_string(),
                actual: actual
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "nothing".to_string()),
            });
        }
    }
    Ok(())
}
