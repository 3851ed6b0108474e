//! CLI profile

use anyhow::{bail, Context as _};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Rule catalog used when `-f` is omitted
    pub catalog: Option<String>,
    /// Engine configuration used when `--config` is omitted
    pub engine_config: Option<String>,
    pub default_format: Option<String>,
}

impl Profile {
    pub fn load(profile: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::path(profile)?;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let path = Self::path(profile)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn set(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        match key {
            "catalog" => self.catalog = Some(value),
            "engine_config" => self.engine_config = Some(value),
            "default_format" => {
                if OutputFormat::from_str(&value, true).is_err() {
                    bail!("unknown output format '{}'", value);
                }
                self.default_format = Some(value);
            }
            _ => bail!("unknown profile key: {}", key),
        }
        Ok(())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or(OutputFormat::Table)
    }

    pub fn path(profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("cannot find home directory")?;
        let filename = match profile {
            Some(p) => format!("desk.{}.toml", p),
            None => "desk.toml".to_string(),
        };
        Ok(home.join(".opensase").join(filename))
    }
}
