use crate::config::ModelEnvConfig;
use crate::domain::errors::ModelError;
use crate::domain::ml::cutoffs::Cutoffs;
use crate::domain::ml::model_metadata::ModelMetadata;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

const METADATA_FILE: &str = "meta.toml";

/// Locates generated models and their artifacts on disk.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
    model_file: String,
    cutoffs_file: String,
}

impl ModelStore {
    pub fn new(
        models_dir: impl Into<PathBuf>,
        model_file: impl Into<String>,
        cutoffs_file: impl Into<String>,
    ) -> Self {
        Self {
            models_dir: models_dir.into(),
            model_file: model_file.into(),
            cutoffs_file: cutoffs_file.into(),
        }
    }

    pub fn from_config(config: &ModelEnvConfig) -> Self {
        Self::new(
            config.models_dir.clone(),
            config.model_file.clone(),
            config.cutoffs_file.clone(),
        )
    }

    /// Directory of a named model. Names must stay inside the models directory.
    pub fn model_dir(&self, model_name: &str) -> Result<PathBuf, ModelError> {
        let valid = !model_name.is_empty()
            && model_name != "."
            && model_name != ".."
            && !model_name.contains(['/', '\\']);
        if !valid {
            return Err(ModelError::InvalidName {
                name: model_name.to_string(),
            });
        }
        Ok(self.models_dir.join(model_name))
    }

    pub fn model_path(&self, model_name: &str) -> Result<PathBuf, ModelError> {
        Ok(self.model_dir(model_name)?.join(&self.model_file))
    }

    pub fn cutoffs_path(&self, model_name: &str) -> Result<PathBuf, ModelError> {
        Ok(self.model_dir(model_name)?.join(&self.cutoffs_file))
    }

    pub fn load_cutoffs(&self, model_name: &str) -> Result<Cutoffs, ModelError> {
        Cutoffs::load(&self.cutoffs_path(model_name)?)
    }

    /// Metadata of a single model, `None` when it has no `meta.toml`.
    pub fn metadata(&self, model_name: &str) -> Result<Option<ModelMetadata>> {
        let path = self.model_dir(model_name)?.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_metadata(&path).map(Some)
    }

    /// All models with readable metadata, newest first.
    pub fn list(&self) -> Result<Vec<ModelMetadata>> {
        let mut metadata_list = Vec::new();
        if !self.models_dir.exists() {
            return Ok(metadata_list);
        }

        let entries = std::fs::read_dir(&self.models_dir)
            .with_context(|| format!("Failed to read models directory {:?}", self.models_dir))?;
        for entry in entries {
            let entry = entry?;
            let config_path = entry.path().join(METADATA_FILE);
            if !entry.path().is_dir() || !config_path.is_file() {
                continue;
            }
            match read_metadata(&config_path) {
                Ok(metadata) => metadata_list.push(metadata),
                Err(e) => warn!("Error on reading model metafile {:?}: {:?}", config_path, e),
            }
        }

        metadata_list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metadata_list)
    }
}

fn read_metadata(path: &Path) -> Result<ModelMetadata> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    ModelMetadata::parse(&contents).with_context(|| format!("Failed to parse {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn meta(name: &str, created_at: &str) -> String {
        format!(
            "created_at = \"{}\"\npair = \"BTCUSDT\"\nis_finished = true\nerror = \"\"\nname = \"{}\"\nuuid = \"{}\"\n",
            created_at,
            name,
            Uuid::new_v4()
        )
    }

    fn temp_store() -> (PathBuf, ModelStore) {
        let dir = std::env::temp_dir().join(format!("rustsignal-models-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = ModelStore::new(&dir, "model.onnx", "cutoffs.json");
        (dir, store)
    }

    #[test]
    fn test_model_paths() {
        let store = ModelStore::new("./models/generated", "model.onnx", "cutoffs.pickle");
        assert_eq!(
            store.model_path("neural_net_model").unwrap(),
            PathBuf::from("./models/generated/neural_net_model/model.onnx")
        );
        assert_eq!(
            store.cutoffs_path("neural_net_model").unwrap(),
            PathBuf::from("./models/generated/neural_net_model/cutoffs.pickle")
        );
    }

    #[test]
    fn test_rejects_escaping_names() {
        let store = ModelStore::new("./models/generated", "model.onnx", "cutoffs.pickle");
        for name in ["", ".", "..", "../secrets", "a/b", "a\\b"] {
            assert!(
                matches!(store.model_dir(name), Err(ModelError::InvalidName { .. })),
                "{} accepted",
                name
            );
        }
    }

    #[test]
    fn test_list_newest_first_and_skips_broken() {
        let (dir, store) = temp_store();
        for (name, created_at) in [
            ("old-model", "2024-01-01T00:00:00Z"),
            ("new-model", "2024-06-01T00:00:00Z"),
        ] {
            std::fs::create_dir_all(dir.join(name)).unwrap();
            std::fs::write(dir.join(name).join("meta.toml"), meta(name, created_at)).unwrap();
        }
        std::fs::create_dir_all(dir.join("broken")).unwrap();
        std::fs::write(dir.join("broken/meta.toml"), "name = 3").unwrap();
        std::fs::create_dir_all(dir.join("no-meta")).unwrap();

        let models = store.list().unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["new-model", "old-model"]);

        assert!(store.metadata("no-meta").unwrap().is_none());
        assert!(store.metadata("broken").is_err());
        assert_eq!(
            store.metadata("old-model").unwrap().unwrap().name,
            "old-model"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let store = ModelStore::new("/definitely/not/here", "model.onnx", "cutoffs.pickle");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_load_cutoffs_from_model_dir() {
        let (dir, store) = temp_store();
        std::fs::create_dir_all(dir.join("m1")).unwrap();
        std::fs::write(dir.join("m1/cutoffs.json"), "[0.5, 0.4, 0.3]").unwrap();

        let cutoffs = store.load_cutoffs("m1").unwrap();
        assert_eq!(cutoffs.values(), &[0.5, 0.4, 0.3]);
        assert!(store.load_cutoffs("m2").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
