//! Files a case run leaves behind: federation job directories and
//! persisted models.
//!
//! Every orchestrated run namespaces its jobs with a fresh suffix, so these
//! accumulate unless removed. The CLI removes them for passed cases and keeps
//! them for failed ones.

use fedtest_types::TestCase;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::input::ProtocolInput;
use crate::select::{self, VARIANCE};
use crate::ProtocolError;

/// Paths a run of `case` under `job_suffix` may have written.
///
/// Roles whose input does not decode contribute nothing.
pub fn case_artifacts(case: &TestCase, job_suffix: &str) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for spec in case.roles() {
        let Ok(input) = ProtocolInput::from_value(spec.input.clone()) else {
            continue;
        };
        let fed_conf = input.fed_conf().clone().namespaced(job_suffix);
        paths.insert(fed_conf.root.join(&fed_conf.session.job_id));

        if let ProtocolInput::Selection(selection) = &input {
            if selection.selector == VARIANCE && spec.role.holds_data() {
                let id = select::model_id(&fed_conf.session.job_id, spec.role);
                paths.insert(selection.config.model_dir.join(format!("{}.json", id)));
            }
        }
    }
    paths.into_iter().collect()
}

/// Remove every artifact of a run; paths that do not exist are skipped.
///
/// Returns the number of paths removed.
pub async fn remove_case_artifacts(case: &TestCase, job_suffix: &str) -> Result<usize, ProtocolError> {
    let mut removed = 0;
    for path in case_artifacts(case, job_suffix) {
        let result = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => Err(e),
        };
        result.map_err(|source| ProtocolError::Federation {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(case = case.name(), path = %path.display(), "Removed run artifact");
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedtest_types::{Role, RoleSpec};
    use serde_json::json;
    use tempfile::TempDir;

    fn selection_case(dir: &TempDir) -> TestCase {
        let input = |role: &str| {
            json!({
                "protocol": "selection",
                "selector": "variance",
                "fed_conf": {
                    "session": {"job_id": "sel"},
                    "root": dir.path().join("fed"),
                    "parties": ["guest", "host", "coordinator"]
                },
                "config": {"model_dir": dir.path().join("models").join(role)},
            })
        };
        TestCase::new("sel")
            .with_role(RoleSpec::new(Role::Guest, input("guest")))
            .with_role(RoleSpec::new(Role::Host, input("host")))
            .with_role(RoleSpec::new(Role::Coordinator, input("coordinator")))
    }

    #[test]
    fn lists_job_dir_once_and_data_role_models() {
        let dir = TempDir::new().unwrap();
        let paths = case_artifacts(&selection_case(&dir), "-sel-7");

        assert_eq!(
            paths,
            vec![
                dir.path().join("fed").join("sel-sel-7"),
                dir.path().join("models/guest/sel-sel-7-guest-variance.json"),
                dir.path().join("models/host/sel-sel-7-host-variance.json"),
            ]
        );
    }

    #[tokio::test]
    async fn removes_what_exists() {
        let dir = TempDir::new().unwrap();
        let case = selection_case(&dir);
        let job_dir = dir.path().join("fed").join("sel-sel-7");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("select.scores.guest.json"), "{}").unwrap();
        let model_dir = dir.path().join("models/guest");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("sel-sel-7-guest-variance.json"), "{}").unwrap();

        assert_eq!(remove_case_artifacts(&case, "-sel-7").await.unwrap(), 2);
        assert!(!job_dir.exists());
        assert!(!model_dir.join("sel-sel-7-guest-variance.json").exists());
        // Other runs are untouched.
        assert_eq!(remove_case_artifacts(&case, "-sel-8").await.unwrap(), 0);
    }
}
