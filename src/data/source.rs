//! Element set sources feeding the propagation service

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use super::loader::load_tle_file;
use super::tle::ElementRecord;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("element source unavailable: {0}")]
    Unavailable(String),

    #[error("element source task failed: {0}")]
    Task(String),
}

/// Supplies raw element records; one call per refresh
#[async_trait]
pub trait ElementSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<ElementRecord>, SourceError>;
}

/// Reads a TLE catalog dump from disk on every fetch
#[derive(Debug, Clone)]
pub struct TleFileSource {
    path: PathBuf,
    label: String,
}

impl TleFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl ElementSource for TleFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<ElementRecord>, SourceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_tle_file(&path))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?
            .map_err(|e| SourceError::Unavailable(format!("{:#}", e)))
    }
}

/// A fixed in-memory record list
#[derive(Debug, Clone, Default)]
pub struct StaticElementSource {
    records: Vec<ElementRecord>,
}

impl StaticElementSource {
    pub fn new(records: Vec<ElementRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ElementSource for StaticElementSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<ElementRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
