//! `.env` loading for compose invocations.
//!
//! Compose reads `<workdir>/.env` itself, but the agent builds a clean
//! environment for the subprocess, so the file is parsed here with dotenvy
//! and merged into that environment.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Load variables from a `.env` file.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::Configuration(format!(
            "Environment file not found: {}",
            path.display()
        )));
    }

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        Error::Configuration(format!(
            "Failed to read environment file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut env_vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse environment file {}: {}",
                path.display(),
                e
            ))
        })?;
        validate_env_name(&key)?;
        env_vars.insert(key, value);
    }

    Ok(env_vars)
}

/// Load `<dir>/.env` if it exists.
pub fn load_optional_env_file(dir: &Path) -> Result<HashMap<String, String>> {
    let path = dir.join(".env");
    if path.is_file() {
        load_env_file(path)
    } else {
        Ok(HashMap::new())
    }
}

/// POSIX variable name: letter or underscore, then alphanumerics or underscores.
pub fn validate_env_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Configuration(format!(
            "Invalid environment variable name '{}'",
            name
        )));
    }
    Ok(())
}
