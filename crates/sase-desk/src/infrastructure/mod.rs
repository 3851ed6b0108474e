//! Infrastructure layer
//!
//! Adapters for the outbound ports: in-memory collaborators for tests and
//! dry runs, a channel-backed notification sink and a file catalog source.

pub mod catalog_file;
pub mod channel;
pub mod memory;

pub use catalog_file::FileCatalogSource;
pub use channel::{ChannelNotificationSink, Notification};
pub use memory::{
    AgentRecord, DirectoryFixture, InMemoryAgentDirectory, InMemoryTicketStore,
    RecordingNotificationSink, SentNotification,
};

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::catalog::CatalogFormat;
use crate::error::{ConfigurationError, DeskResult};

/// Read a YAML or JSON document, chosen by file extension.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> DeskResult<T> {
    let text = std::fs::read_to_string(path)?;
    let parsed = match CatalogFormat::from_path(path) {
        CatalogFormat::Json => serde_json::from_str(&text).map_err(|e| e.to_string()),
        CatalogFormat::Yaml => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| {
        ConfigurationError::Parse(format!("{}: {}", path.display(), reason)).into()
    })
}
