//! Run audit store
//!
//! Persists finished run reports so a run can be inspected after the fact.
//! Reports never contain credentials.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use strata_core::dto::run::RunReport;
use uuid::Uuid;

/// Storage for finished run reports
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, report: &RunReport) -> Result<()>;

    async fn load(&self, run_id: Uuid) -> Result<RunReport>;
}

/// Stores each report as `{dir}/{run_id}.json`
pub struct FileRunStore {
    dir: PathBuf,
}

impl FileRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn save(&self, report: &RunReport) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;

        let path = self.path_for(report.run_id);
        let body = serde_json::to_vec_pretty(report).context("Failed to serialize run report")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write run report {}", path.display()))?;

        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<RunReport> {
        let path = self.path_for(run_id);
        let body = tokio::fs::read(&path)
            .await
            .with_context(|| format!("No stored report for run {}", run_id))?;

        serde_json::from_slice(&body)
            .with_context(|| format!("Failed to parse run report {}", path.display()))
    }
}
