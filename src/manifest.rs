use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::fonts::FontSet;
use crate::schema::SessionConfig;

/// Reads a session manifest, resolves font paths against its directory and
/// validates the result.
pub fn load_session_config(path: &Path) -> Result<SessionConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut config = parse_session_config(&contents, path)?;

    let manifest_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    config.resolve_paths(&manifest_dir);

    config
        .validate()
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    Ok(config)
}

fn parse_session_config(contents: &str, path: &Path) -> Result<SessionConfig> {
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(crate::error::StreamError::configuration(format!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )))
    })
}

/// Loads the manifest and its fonts, which is everything a session needs
/// before the output is opened.
pub fn load_and_check(path: &Path) -> Result<(SessionConfig, FontSet)> {
    let config = load_session_config(path)?;
    let fonts = FontSet::load(&config.fonts)
        .with_context(|| format!("invalid fonts in manifest {}", path.display()))?;
    Ok((config, fonts))
}
