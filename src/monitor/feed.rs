//! Conjunction assessment feeds

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::{load_cdm_file, ConjunctionAssessment};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("conjunction feed unavailable: {0}")]
    Unavailable(String),

    #[error("conjunction feed task failed: {0}")]
    Task(String),
}

/// Supplies the current conjunction assessments; one fetch per monitor cycle
#[async_trait]
pub trait ConjunctionFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Assessments with TCA inside the next `hours_ahead` hours, at most `limit`
    async fn fetch(
        &self,
        hours_ahead: u32,
        limit: usize,
    ) -> Result<Vec<ConjunctionAssessment>, FeedError>;
}

/// Re-reads a JSON CDM dump (plain or `.gz`) on every fetch
///
/// The dump is assumed to already cover the wanted window, so `hours_ahead`
/// is not applied; records are returned in file order up to `limit`.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
    label: String,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl ConjunctionFeed for JsonFileFeed {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(
        &self,
        _hours_ahead: u32,
        limit: usize,
    ) -> Result<Vec<ConjunctionAssessment>, FeedError> {
        let path = self.path.clone();
        let mut assessments = tokio::task::spawn_blocking(move || load_cdm_file(&path))
            .await
            .map_err(|e| FeedError::Task(e.to_string()))?
            .map_err(|e| FeedError::Unavailable(format!("{:#}", e)))?;

        assessments.truncate(limit);
        Ok(assessments)
    }
}
