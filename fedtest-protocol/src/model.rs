//! Directory-backed model store: one JSON file per model id.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::contract::{ModelInfo, ModelStore, SelectionModel};
use crate::ProtocolError;

/// Stores models as `<dir>/<model_id>.json`.
#[derive(Debug, Clone)]
pub struct DirModelStore {
    dir: PathBuf,
}

impl DirModelStore {
    /// Store models under `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, model_id: &str) -> Result<PathBuf, ProtocolError> {
        let valid = !model_id.is_empty()
            && model_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !model_id.starts_with('.');
        if !valid {
            return Err(ProtocolError::ModelStore {
                model_id: model_id.to_string(),
                reason: "invalid model id".to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", model_id)))
    }
}

#[async_trait]
impl ModelStore for DirModelStore {
    async fn save(&self, model: &SelectionModel) -> Result<ModelInfo, ProtocolError> {
        let fail = |reason: String| ProtocolError::ModelStore {
            model_id: model.model_id.clone(),
            reason,
        };
        let path = self.path(&model.model_id)?;
        let payload = serde_json::to_vec_pretty(model).map_err(|e| fail(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fail(format!("create {}: {}", self.dir.display(), e)))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| fail(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| fail(format!("rename to {}: {}", path.display(), e)))?;

        tracing::debug!(model_id = %model.model_id, path = %path.display(), "Model saved");
        Ok(ModelInfo {
            model_id: model.model_id.clone(),
        })
    }

    async fn load(&self, model_id: &str) -> Result<SelectionModel, ProtocolError> {
        let fail = |reason: String| ProtocolError::ModelStore {
            model_id: model_id.to_string(),
            reason,
        };
        let path = self.path(model_id)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| fail(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes).map_err(|e| fail(e.to_string()))
    }
}
