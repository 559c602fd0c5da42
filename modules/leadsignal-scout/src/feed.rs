//! Target feeds. The CRM owns the production feed and supplies targets at
//! the boundary; a fixed file-backed feed ships for development and tests.

use async_trait::async_trait;
use tracing::info;

use leadsignal_common::ResearchTarget;

use crate::error::{Result, ScoutError};

#[async_trait]
pub trait TargetFeed: Send + Sync {
    /// Every target the CRM currently wants researched. The scheduler
    /// decides which of them actually run this sweep.
    async fn eligible_targets(&self) -> Result<Vec<ResearchTarget>>;
}

/// Fixed target list.
#[derive(Debug)]
pub struct StaticTargetFeed {
    targets: Vec<ResearchTarget>,
}

impl StaticTargetFeed {
    pub fn new(targets: Vec<ResearchTarget>) -> Self {
        Self { targets }
    }

    /// Load a JSON array of targets from disk.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScoutError::Config(format!("cannot read targets at {path}: {e}")))?;
        let targets: Vec<ResearchTarget> = serde_json::from_str(&raw)
            .map_err(|e| ScoutError::Config(format!("invalid targets at {path}: {e}")))?;
        info!(count = targets.len(), path, "Loaded research targets");
        Ok(Self::new(targets))
    }
}

#[async_trait]
impl TargetFeed for StaticTargetFeed {
    async fn eligible_targets(&self) -> Result<Vec<ResearchTarget>> {
        Ok(self.targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uuid::Uuid;

    #[tokio::test]
    async fn loads_targets_from_json_file() {
        let id = Uuid::new_v4();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"target_id": "{id}", "url": "https://acme.example"}}]"#
        )
        .unwrap();

        let feed = StaticTargetFeed::from_file(file.path().to_str().unwrap()).unwrap();
        let targets = feed.eligible_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_id, id);
        assert!(targets[0].platform_hint.is_none());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = StaticTargetFeed::from_file("/nonexistent/targets.json").unwrap_err();
        assert!(matches!(err, ScoutError::Config(_)));
    }
}
