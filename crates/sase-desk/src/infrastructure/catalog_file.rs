//! File-backed rule catalog source

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::catalog::CatalogFormat;
use crate::domain::RuleSet;
use crate::error::ConfigurationError;
use crate::ports::outbound::CatalogSource;

/// Rule catalog read from a YAML or JSON file on every load
#[derive(Clone, Debug)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn load(&self) -> Result<RuleSet, ConfigurationError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigurationError::Unreadable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        CatalogFormat::from_path(&self.path).parse(&text)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
