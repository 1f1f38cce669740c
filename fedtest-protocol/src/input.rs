//! Typed views of a role's opaque input.

use fedtest_types::{Role, TestCase};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::federation::FederationConf;
use crate::ProtocolError;

/// A security scheme name and its parameters, e.g. `["sha256", {"salt": "s"}]`.
pub type SecurityParam = (String, Value);

/// Which protocol a role runs, tagged by `protocol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProtocolInput {
    /// Sample alignment.
    Alignment(AlignmentInput),
    /// Hetero feature selection.
    Selection(SelectionInput),
}

impl ProtocolInput {
    /// Decode a role's input blob.
    pub fn from_value(input: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(input).map_err(|e| ProtocolError::InvalidInput(e.to_string()))
    }

    /// The federation descriptor.
    pub fn fed_conf(&self) -> &FederationConf {
        match self {
            ProtocolInput::Alignment(a) => &a.fed_conf,
            ProtocolInput::Selection(s) => &s.fed_conf,
        }
    }

    fn protocol(&self) -> &'static str {
        match self {
            ProtocolInput::Alignment(_) => "alignment",
            ProtocolInput::Selection(_) => "selection",
        }
    }
}

/// Alignment role input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentInput {
    /// Alignment method identifier.
    pub method: String,
    /// Identifier columns; empty for a coordinator.
    #[serde(default)]
    pub id_cols: Vec<Vec<String>>,
    /// Security schemes.
    #[serde(default)]
    pub security: Vec<SecurityParam>,
    /// Federation descriptor.
    pub fed_conf: FederationConf,
}

/// Selection role input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionInput {
    /// Selector name.
    pub selector: String,
    /// Training, security and prediction parameters.
    #[serde(default)]
    pub meta_params: MetaParams,
    /// Federation descriptor.
    pub fed_conf: FederationConf,
    /// Execution context.
    #[serde(default)]
    pub config: ContextConf,
    /// Training dataset; required for data-holding roles.
    pub train_csv: Option<PathBuf>,
    /// Verification dataset.
    pub verify_csv: Option<PathBuf>,
    /// Schema of both datasets.
    pub csv_desc: Option<CsvDesc>,
    /// JSON file `{"name": [...]}` naming candidate features.
    pub feat_infos: Option<PathBuf>,
}

/// `meta_params` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaParams {
    /// Training parameters, passed to the selector.
    #[serde(default = "empty_object")]
    pub train_param: Value,
    /// Security parameters, passed to the selector.
    #[serde(default)]
    pub security_param: Value,
    /// Prediction parameters, passed to the predict-only selector.
    #[serde(default = "empty_object")]
    pub predict_param: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Default for MetaParams {
    fn default() -> Self {
        Self {
            train_param: empty_object(),
            security_param: Value::Null,
            predict_param: empty_object(),
        }
    }
}

/// Execution context: where persisted models live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConf {
    /// Model directory (default: `<tmp>/fedtest-models`).
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

fn default_model_dir() -> PathBuf {
    std::env::temp_dir().join("fedtest-models")
}

impl Default for ContextConf {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
        }
    }
}

/// Dataset schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvDesc {
    /// Column holding the sample identifier.
    pub id_column: String,
    /// Feature columns; every other column when absent.
    pub features: Option<Vec<String>>,
    /// Label column, excluded from features.
    pub label_column: Option<String>,
}

/// Candidate feature names read from a `feat_infos` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatInfos {
    /// Feature names; empty means every feature.
    #[serde(default)]
    pub name: Vec<String>,
}

/// Check that a case's roles form a runnable protocol run.
///
/// Every role must run the same protocol, a guest and at least one host must
/// take part, and each role's `fed_conf.parties` must list exactly the
/// case's roles.
pub fn check_case(case: &TestCase) -> Result<(), ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidInput(format!("case {}: {}", case.name(), reason));

    let mut roles: Vec<Role> = case.role_names().collect();
    roles.sort();
    if !roles.contains(&Role::Guest) {
        return Err(invalid("no guest role".to_string()));
    }
    if !roles.iter().any(Role::is_host) {
        return Err(invalid("no host role".to_string()));
    }

    let mut protocol = None;
    for spec in case.roles() {
        let input = ProtocolInput::from_value(spec.input.clone())
            .map_err(|e| invalid(format!("{}: {}", spec.role, e)))?;

        match protocol {
            None => protocol = Some(input.protocol()),
            Some(p) if p != input.protocol() => {
                return Err(invalid(format!(
                    "{} runs {} but other roles run {}",
                    spec.role,
                    input.protocol(),
                    p
                )))
            }
            Some(_) => {}
        }

        let mut parties = input.fed_conf().parties.clone();
        parties.sort();
        if parties != roles {
            return Err(invalid(format!(
                "{} fed_conf parties {:?} do not match case roles {:?}",
                spec.role, parties, roles
            )));
        }
    }
    Ok(())
}
