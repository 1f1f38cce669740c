//! `variance`: hetero feature selection by feature variance.
//!
//! Each data party scores its candidate features by population variance and
//! publishes the scores. A coordinator, when present, ranks every party's
//! scores and publishes the per-party selection; without one, every data
//! party collects all scores and computes the same selection itself. A
//! party's output is its training data projected onto its selected features.
//!
//! Ranking keeps features with variance strictly above `threshold`, orders
//! them by variance (descending, ties by party then name) and cuts at
//! `top_k` when set. Each party's selected features keep their dataset
//! column order.

use async_trait::async_trait;
use fedtest_types::{Role, Table};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::{Dataset, ModelInfo, ModelStore, SelectionModel, Selector, TrainMeta};
use crate::federation::FileFederation;
use crate::input::FeatInfos;
use crate::ProtocolError;

/// Selector name.
pub const VARIANCE: &str = "variance";

/// Id under which `party`'s trained variance model is persisted for a job.
pub fn model_id(job_id: &str, party: Role) -> String {
    format!("{}-{}-{}", job_id, party, VARIANCE)
}

const SCORES: &str = "select.scores";
const DECISION: &str = "select.decision";

/// `train_param` accepted by the variance selector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VarianceParams {
    /// Must be `hetero`.
    pub process_method: String,
    /// Keep at most this many features across all parties.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Keep only features whose variance exceeds this (default: 0.0).
    #[serde(default)]
    pub threshold: f64,
}

impl VarianceParams {
    /// Decode and check training parameters.
    pub fn from_value(train_param: &Value) -> Result<Self, ProtocolError> {
        let params: Self = serde_json::from_value(train_param.clone())
            .map_err(|e| ProtocolError::InvalidInput(format!("variance train_param: {}", e)))?;
        if params.process_method != "hetero" {
            return Err(ProtocolError::UnsupportedMethod(format!(
                "process_method {} for {}",
                params.process_method, VARIANCE
            )));
        }
        if !params.threshold.is_finite() {
            return Err(ProtocolError::InvalidInput(
                "variance threshold must be finite".to_string(),
            ));
        }
        Ok(params)
    }
}

/// Reference hetero selector.
pub struct VarianceSelector {
    mode: Mode,
}

enum Mode {
    Train {
        params: VarianceParams,
        federation: FileFederation,
        store: Arc<dyn ModelStore>,
    },
    Predict {
        model: SelectionModel,
    },
}

impl std::fmt::Debug for VarianceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.mode {
            Mode::Train { params, federation, .. } => f
                .debug_struct("VarianceSelector")
                .field("params", params)
                .field("party", &federation.me())
                .finish(),
            Mode::Predict { model } => f
                .debug_struct("VarianceSelector")
                .field("model_id", &model.model_id)
                .finish(),
        }
    }
}

impl VarianceSelector {
    /// A selector that trains through `federation` and persists to `store`.
    pub fn new(
        meta: TrainMeta,
        federation: FileFederation,
        store: Arc<dyn ModelStore>,
    ) -> Result<Self, ProtocolError> {
        let params = VarianceParams::from_value(&meta.train_param)?;
        Ok(Self {
            mode: Mode::Train {
                params,
                federation,
                store,
            },
        })
    }

    /// A predict-only selector around a loaded model.
    pub fn predictor(model: SelectionModel) -> Self {
        Self {
            mode: Mode::Predict { model },
        }
    }
}

#[async_trait]
impl Selector for VarianceSelector {
    async fn train(
        &self,
        train: Option<&Dataset>,
        verify: Option<&Dataset>,
        feat_infos: &FeatInfos,
    ) -> Result<(Table, Vec<ModelInfo>), ProtocolError> {
        let Mode::Train {
            params,
            federation,
            store,
        } = &self.mode
        else {
            return Err(ProtocolError::InvalidInput(
                "predict-only selector cannot train".to_string(),
            ));
        };
        let me = federation.me();

        if me.is_coordinator() {
            let parties = federation.data_parties();
            let scores: Vec<(Role, Vec<(String, f64)>)> = federation.collect_all(SCORES, &parties).await?;
            let decision = decide(&scores, params);
            tracing::info!(
                selected = decision.values().map(Vec::len).sum::<usize>(),
                "Coordinator published feature selection"
            );
            federation.publish(DECISION, &decision).await?;
            return Ok((Table::empty(), Vec::new()));
        }

        let train = train.ok_or_else(|| {
            ProtocolError::InvalidInput(format!("{} has no training data", me))
        })?;
        let candidates: Vec<String> = if feat_infos.name.is_empty() {
            train.features.columns.clone()
        } else {
            feat_infos.name.clone()
        };
        let mine = candidates
            .iter()
            .map(|name| {
                let values = train
                    .features
                    .column(name)
                    .ok_or_else(|| fedtest_types::TypesError::MissingColumn(name.clone()))?;
                Ok((name.clone(), variance(&values)))
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        federation.publish(SCORES, &mine).await?;

        let decision = if federation.has_coordinator() {
            federation.collect(DECISION, Role::Coordinator).await?
        } else {
            let peers = federation.data_peers();
            let mut scores: Vec<(Role, Vec<(String, f64)>)> = federation.collect_all(SCORES, &peers).await?;
            scores.push((me, mine.clone()));
            decide(&scores, params)
        };
        let selected = decision.get(&me).cloned().unwrap_or_default();

        let output = train.features.select(&selected)?;
        if let Some(verify) = verify {
            verify.features.select(&selected)?;
        }

        let model = SelectionModel {
            model_id: model_id(&federation.conf().session.job_id, me),
            selector: VARIANCE.to_string(),
            selected,
            scores: mine,
        };
        let info = store.save(&model).await?;
        tracing::info!(party = %me, selected = ?model.selected, model_id = %info.model_id, "Trained selector");
        Ok((output, vec![info]))
    }

    async fn predict(&self, data: &Dataset) -> Result<Table, ProtocolError> {
        match &self.mode {
            Mode::Predict { model } => Ok(data.features.select(&model.selected)?),
            Mode::Train { .. } => Err(ProtocolError::InvalidInput(
                "training selector has no loaded model; build a predictor".to_string(),
            )),
        }
    }
}

/// Population variance; zero for fewer than two values.
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Rank every party's scores into a per-party selection.
fn decide(scores: &[(Role, Vec<(String, f64)>)], params: &VarianceParams) -> BTreeMap<Role, Vec<String>> {
    let mut ranked: Vec<(Role, &str, f64)> = scores
        .iter()
        .flat_map(|(role, features)| {
            features
                .iter()
                .filter(|(_, v)| *v > params.threshold)
                .map(move |(name, v)| (*role, name.as_str(), *v))
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(b.1))
    });
    if let Some(k) = params.top_k {
        ranked.truncate(k);
    }

    let mut decision: BTreeMap<Role, Vec<String>> =
        scores.iter().map(|(role, _)| (*role, Vec::new())).collect();
    for (role, features) in scores {
        let keep = decision.entry(*role).or_default();
        for (name, _) in features {
            if ranked.iter().any(|(r, n, _)| r == role && *n == name.as_str()) {
                keep.push(name.clone());
            }
        }
    }
    decision
}
