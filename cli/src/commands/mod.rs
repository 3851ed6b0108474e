//! CLI Commands

pub mod config;
pub mod deadline;
pub mod simulate;
pub mod validate;

use anyhow::{anyhow, Context as _};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use sase_desk::infrastructure::FileCatalogSource;
use sase_desk::{CatalogSource, EngineConfig, RuleCatalog};

use crate::config::Profile;
use crate::output::OutputFormat;

/// Settings shared by every command
pub struct Context {
    pub profile: Profile,
    pub profile_name: Option<String>,
    pub engine_config: Option<PathBuf>,
    pub format: OutputFormat,
}

impl Context {
    /// Catalog given on the command line, else the profile's.
    pub fn catalog_path(&self, file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        file.or_else(|| self.profile.catalog.as_ref().map(PathBuf::from))
            .ok_or_else(|| {
                anyhow!("no rule catalog given (use -f or set `catalog` in the profile)")
            })
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let path = self
            .engine_config
            .clone()
            .or_else(|| self.profile.engine_config.as_ref().map(PathBuf::from));
        match path {
            Some(path) => {
                EngineConfig::load(&path).with_context(|| format!("loading {}", path.display()))
            }
            None => Ok(EngineConfig::default()),
        }
    }
}

pub async fn load_catalog(path: &Path) -> anyhow::Result<RuleCatalog> {
    let source = FileCatalogSource::new(path);
    let rules = source.load().await?;
    RuleCatalog::load(rules).with_context(|| format!("validating {}", source.describe()))
}

pub fn parse_instant(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("'{}' is not an RFC 3339 instant", value))
}
