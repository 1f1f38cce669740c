//! Collaborator contract consumed by the role logic.
//!
//! Role workers never name a concrete protocol implementation. They ask a
//! [`ProtocolBackend`] for an [`Aligner`] or [`Selector`] and drive it
//! through these traits, the same way a sync client drives a transport.

use async_trait::async_trait;
use fedtest_types::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::federation::{FederationConf, FileFederation};
use crate::input::{ContextConf, CsvDesc, FeatInfos, SecurityParam};
use crate::ProtocolError;

/// A loaded dataset: numeric features plus an optional label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Feature table keyed by sample identifier.
    pub features: Table,
    /// Label per row, when the schema names a label column.
    pub label: Option<Vec<f64>>,
}

/// Training meta-parameters handed to a selector constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainMeta {
    /// Training parameters (always carries `process_method = "hetero"`).
    pub train_param: Value,
    /// Security parameters.
    pub security_param: Value,
    /// Federation descriptor of this party.
    pub federal_info: FederationConf,
}

/// Handle to a persisted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier to load the model by.
    pub model_id: String,
}

/// What a feature selector persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionModel {
    /// Model identifier.
    pub model_id: String,
    /// Selector that produced the model.
    pub selector: String,
    /// Selected feature names, in output column order.
    pub selected: Vec<String>,
    /// Score of every candidate feature this party contributed.
    pub scores: Vec<(String, f64)>,
}

/// Sample aligner.
#[async_trait]
pub trait Aligner: Send + Sync {
    /// Align identifier columns with the other parties.
    ///
    /// Returns the aligned columns; a coordinator passes and gets back no
    /// columns.
    async fn align(&self, id_cols: &[Vec<String>]) -> Result<Vec<Vec<String>>, ProtocolError>;
}

/// Feature selector / learner.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Train on this party's data; a coordinator passes no data.
    ///
    /// Returns the transformed training data and the persisted models, last
    /// one most recent.
    async fn train(
        &self,
        train: Option<&Dataset>,
        verify: Option<&Dataset>,
        feat_infos: &FeatInfos,
    ) -> Result<(Table, Vec<ModelInfo>), ProtocolError>;

    /// Transform `data` with the trained or loaded model.
    async fn predict(&self, data: &Dataset) -> Result<Table, ProtocolError>;
}

/// Persisted model storage.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Persist a model under its `model_id`.
    async fn save(&self, model: &SelectionModel) -> Result<ModelInfo, ProtocolError>;

    /// Load a model by id.
    async fn load(&self, model_id: &str) -> Result<SelectionModel, ProtocolError>;
}

/// Tabular dataset loader.
pub trait DatasetLoader: Send + Sync {
    /// Load at most `max_rows` rows of `path` under `desc`.
    fn load(&self, path: &Path, desc: &CsvDesc, max_rows: usize) -> Result<Dataset, ProtocolError>;
}

/// Factory for every collaborator a role needs.
pub trait ProtocolBackend: Send + Sync {
    /// Build an aligner for `method`.
    fn aligner(
        &self,
        method: &str,
        federation: FileFederation,
        security: &[SecurityParam],
    ) -> Result<Box<dyn Aligner>, ProtocolError>;

    /// Build a training selector.
    fn selector(
        &self,
        name: &str,
        meta: TrainMeta,
        federation: FileFederation,
        context: &ContextConf,
    ) -> Result<Box<dyn Selector>, ProtocolError>;

    /// Build a predict-only selector around a loaded model.
    fn predictor(
        &self,
        name: &str,
        predict_param: &Value,
        model: SelectionModel,
    ) -> Result<Box<dyn Selector>, ProtocolError>;

    /// Model storage for `context`.
    fn model_store(&self, context: &ContextConf) -> Result<Box<dyn ModelStore>, ProtocolError>;

    /// Dataset loader.
    fn loader(&self) -> &dyn DatasetLoader;
}
