//! Loading config entries from YAML

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::{ConfigEntry, ConfigError, ConfigResult};

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    entries: Vec<ConfigEntry>,
}

/// Parse and validate the entries of a YAML document
pub fn parse_entries(content: &str) -> ConfigResult<Vec<ConfigEntry>> {
    let file: ConfigFile = serde_yaml::from_str(content)?;

    let mut seen = HashSet::new();
    for entry in &file.entries {
        if !seen.insert(entry.entry_id.as_str()) {
            return Err(ConfigError::DuplicateEntry {
                entry_id: entry.entry_id.clone(),
            });
        }
        entry.validate()?;
    }

    Ok(file.entries)
}

/// Read, parse and validate a configuration file
pub fn load_entries(path: impl AsRef<Path>) -> ConfigResult<Vec<ConfigEntry>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let entries = parse_entries(&content)?;
    info!(path = %path.display(), count = entries.len(), "Loaded config entries");
    Ok(entries)
}
