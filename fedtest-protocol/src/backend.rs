//! The reference backend wired behind [`ProtocolBackend`].

use serde_json::Value;
use std::sync::Arc;

use crate::align::{HashAligner, SHA256_SAL};
use crate::contract::{Aligner, DatasetLoader, ModelStore, ProtocolBackend, SelectionModel, Selector, TrainMeta};
use crate::dataset::CsvLoader;
use crate::federation::FileFederation;
use crate::input::{ContextConf, SecurityParam};
use crate::model::DirModelStore;
use crate::select::{VarianceSelector, VARIANCE};
use crate::ProtocolError;

/// File federation, `sha256_sal` alignment, `variance` selection,
/// directory model store and comma-separated datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend {
    loader: CsvLoader,
}

impl LocalBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtocolBackend for LocalBackend {
    fn aligner(
        &self,
        method: &str,
        federation: FileFederation,
        security: &[SecurityParam],
    ) -> Result<Box<dyn Aligner>, ProtocolError> {
        match method {
            SHA256_SAL => Ok(Box::new(HashAligner::new(federation, security)?)),
            other => Err(ProtocolError::UnsupportedMethod(other.to_string())),
        }
    }

    fn selector(
        &self,
        name: &str,
        meta: TrainMeta,
        federation: FileFederation,
        context: &ContextConf,
    ) -> Result<Box<dyn Selector>, ProtocolError> {
        match name {
            VARIANCE => {
                let store: Arc<dyn ModelStore> = Arc::new(DirModelStore::new(&context.model_dir));
                Ok(Box::new(VarianceSelector::new(meta, federation, store)?))
            }
            other => Err(ProtocolError::UnsupportedSelector(other.to_string())),
        }
    }

    fn predictor(
        &self,
        name: &str,
        _predict_param: &Value,
        model: SelectionModel,
    ) -> Result<Box<dyn Selector>, ProtocolError> {
        if name != VARIANCE || model.selector != VARIANCE {
            return Err(ProtocolError::UnsupportedSelector(format!(
                "{} cannot load a {} model",
                name, model.selector
            )));
        }
        Ok(Box::new(VarianceSelector::predictor(model)))
    }

    fn model_store(&self, context: &ContextConf) -> Result<Box<dyn ModelStore>, ProtocolError> {
        Ok(Box::new(DirModelStore::new(&context.model_dir)))
    }

    fn loader(&self) -> &dyn DatasetLoader {
        &self.loader
    }
}
