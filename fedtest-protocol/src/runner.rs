//! Worker-side role logic: one request in, one result out.

use fedtest_types::{RoleOutput, RunResult, WorkerRequest};
use serde_json::Value;
use std::path::Path;

use crate::contract::{Dataset, ProtocolBackend, TrainMeta};
use crate::federation::FileFederation;
use crate::input::{AlignmentInput, FeatInfos, ProtocolInput, SelectionInput};
use crate::ProtocolError;

/// Run `request.role`'s side of the protocol and report the outcome.
///
/// Never fails: protocol errors become a failure result naming the cause.
pub async fn run_role(request: &WorkerRequest, backend: &dyn ProtocolBackend) -> RunResult {
    let role = request.role;
    tracing::info!(case = %request.case, %role, "Role started");
    match execute(request, backend).await {
        Ok(output) => {
            tracing::info!(case = %request.case, %role, output = output.kind(), "Role finished");
            RunResult::success(role, output)
        }
        Err(e) => {
            tracing::error!(case = %request.case, %role, "Role failed: {}", e);
            RunResult::failure(role, e.to_string())
        }
    }
}

async fn execute(request: &WorkerRequest, backend: &dyn ProtocolBackend) -> Result<RoleOutput, ProtocolError> {
    match ProtocolInput::from_value(request.input.clone())? {
        ProtocolInput::Alignment(input) => align(request, input, backend).await,
        ProtocolInput::Selection(input) => select(request, input, backend).await,
    }
}

async fn align(
    request: &WorkerRequest,
    input: AlignmentInput,
    backend: &dyn ProtocolBackend,
) -> Result<RoleOutput, ProtocolError> {
    let federation = FileFederation::new(input.fed_conf.namespaced(&request.job_suffix), request.role)?;
    let aligner = backend.aligner(&input.method, federation, &input.security)?;

    if request.role.is_coordinator() {
        aligner.align(&[]).await?;
        return Ok(RoleOutput::Acknowledged);
    }
    let columns = aligner.align(&input.id_cols).await?;
    Ok(RoleOutput::Aligned { columns })
}

async fn select(
    request: &WorkerRequest,
    input: SelectionInput,
    backend: &dyn ProtocolBackend,
) -> Result<RoleOutput, ProtocolError> {
    let fed_conf = input.fed_conf.clone().namespaced(&request.job_suffix);
    let federation = FileFederation::new(fed_conf.clone(), request.role)?;

    let train_param = match input.meta_params.train_param.clone() {
        Value::Object(mut map) => {
            map.insert("process_method".to_string(), Value::from("hetero"));
            Value::Object(map)
        }
        Value::Null => serde_json::json!({"process_method": "hetero"}),
        other => {
            return Err(ProtocolError::InvalidInput(format!(
                "train_param must be a table, got {}",
                other
            )))
        }
    };
    let meta = TrainMeta {
        train_param,
        security_param: input.meta_params.security_param.clone(),
        federal_info: fed_conf,
    };
    tracing::debug!(role = %request.role, train_param = %meta.train_param, "Selector meta params");
    let selector = backend.selector(&input.selector, meta, federation, &input.config)?;

    if request.role.is_coordinator() {
        selector.train(None, None, &FeatInfos::default()).await?;
        return Ok(RoleOutput::Acknowledged);
    }

    let train = load(backend, &input, input.train_csv.as_deref(), request.max_rows)?
        .ok_or_else(|| ProtocolError::InvalidInput(format!("{} needs train_csv", request.role)))?;
    let verify = load(backend, &input, input.verify_csv.as_deref(), request.max_rows)?;
    let feat_infos = read_feat_infos(input.feat_infos.as_deref()).await?;

    let (trained, models) = selector.train(Some(&train), verify.as_ref(), &feat_infos).await?;

    let model_id = models
        .last()
        .map(|m| m.model_id.clone())
        .ok_or_else(|| ProtocolError::ModelStore {
            model_id: String::new(),
            reason: "training persisted no model".to_string(),
        })?;
    let saved = backend.model_store(&input.config)?.load(&model_id).await?;
    let predictor = backend.predictor(&input.selector, &input.meta_params.predict_param, saved)?;

    let train_reload = load(backend, &input, input.train_csv.as_deref(), request.max_rows)?
        .unwrap_or_default();
    let reloaded = predictor.predict(&train_reload).await?;

    tracing::debug!(role = %request.role, %trained, %reloaded, "Selection outputs");
    Ok(RoleOutput::Selected { trained, reloaded })
}

fn load(
    backend: &dyn ProtocolBackend,
    input: &SelectionInput,
    path: Option<&Path>,
    max_rows: usize,
) -> Result<Option<Dataset>, ProtocolError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let desc = input
        .csv_desc
        .as_ref()
        .ok_or_else(|| ProtocolError::InvalidInput("csv_desc is required with a dataset".to_string()))?;
    backend.loader().load(path, desc, max_rows).map(Some)
}

async fn read_feat_infos(path: Option<&Path>) -> Result<FeatInfos, ProtocolError> {
    let Some(path) = path else {
        return Ok(FeatInfos::default());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProtocolError::Dataset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&content).map_err(|e| ProtocolError::Dataset {
        path: path.to_path_buf(),
        reason: format!("feat_infos: {}", e),
    })
}
