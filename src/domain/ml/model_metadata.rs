use crate::domain::types::Pair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Contents of `meta.toml` written next to each generated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created_at: DateTime<Utc>,
    pub pair: Pair,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub error: String,
    pub name: String,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Ready,
    Failed,
    Generating,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelStatus::Ready => "OK",
            ModelStatus::Failed => "ERR",
            ModelStatus::Generating => "WORK",
        };
        f.pad(label)
    }
}

impl ModelMetadata {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn status(&self) -> ModelStatus {
        if !self.is_finished {
            ModelStatus::Generating
        } else if self.error.is_empty() {
            ModelStatus::Ready
        } else {
            ModelStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"
created_at = "2024-03-01T10:00:00Z"
pair = "BTCUSDT"
is_finished = true
error = ""
name = "brave-otter"
uuid = "67e55044-10b1-426f-9247-bb680e5fe0c8"
"#;

    #[test]
    fn test_parse_metadata() {
        let meta = ModelMetadata::parse(META).unwrap();
        assert_eq!(meta.name, "brave-otter");
        assert_eq!(meta.pair.as_str(), "BTCUSDT");
        assert_eq!(meta.status(), ModelStatus::Ready);
    }

    #[test]
    fn test_status_from_flags() {
        let mut meta = ModelMetadata::parse(META).unwrap();
        meta.error = "training diverged".to_string();
        assert_eq!(meta.status(), ModelStatus::Failed);
        assert_eq!(meta.status().to_string(), "ERR");

        meta.is_finished = false;
        assert_eq!(meta.status(), ModelStatus::Generating);
    }

    #[test]
    fn test_parse_rejects_bad_pair() {
        let broken = META.replace("BTCUSDT", "BTC/USDT");
        assert!(ModelMetadata::parse(&broken).is_err());
    }
}
