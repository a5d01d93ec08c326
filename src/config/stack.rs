use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name suffix of persisted stack configs.
pub const STACK_CONFIG_SUFFIX: &str = ".stack.json";

/// Compose file name written by initializers and used when none is configured.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Compose file produced by sync; preferred over the raw file when present.
pub const STACK_COMPOSE_FILE: &str = "docker-compose.stack.yml";

pub const DEFAULT_BRANCH: &str = "main";

/// Persisted configuration of a managed stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    /// Initializer kind that created the stack.
    #[serde(rename = "type", default = "default_stack_type")]
    pub stack_type: String,
    /// Subdirectory of the project dir holding the compose file.
    #[serde(default)]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryConfig>,
    /// Inline compose document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// An empty object in older config files leaves this blank; sync rejects it.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub private: bool,
    /// Credential store id of the SSH key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_ref: Option<String>,
    /// Explicit path to the SSH key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
}

fn default_stack_type() -> String {
    "scratch".to_string()
}

fn default_compose_file() -> String {
    DEFAULT_COMPOSE_FILE.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl RepositoryConfig {
    pub fn public(url: impl Into<String>, branch: impl Into<String>) -> Self {
        RepositoryConfig {
            url: url.into(),
            branch: branch.into(),
            private: false,
            private_key_ref: None,
            private_key_file: None,
        }
    }
}

impl StackConfig {
    pub fn new(name: impl Into<String>, stack_type: impl Into<String>) -> Self {
        StackConfig {
            name: name.into(),
            stack_type: stack_type.into(),
            base_path: String::new(),
            repository: None,
            template: None,
            compose_file: default_compose_file(),
            compose_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StackConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write atomically via a sibling temp file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), self)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_stack_name(&self.name)?;
        validate_relative_path("base_path", &self.base_path)?;
        validate_relative_path("compose_file", &self.compose_file)?;
        if self.compose_file.is_empty() {
            return Err(Error::Configuration(format!(
                "Stack '{}' has an empty compose_file",
                self.name
            )));
        }
        Ok(())
    }

    /// Project dir joined with `base_path`.
    pub fn working_dir(&self, project_dir: &Path) -> PathBuf {
        if self.base_path.is_empty() {
            project_dir.to_path_buf()
        } else {
            project_dir.join(&self.base_path)
        }
    }
}

/// Stack names double as directory names and compose project names.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "Invalid stack name '{}': use lowercase letters, digits, '-' and '_', starting with a letter or digit",
            name
        )))
    }
}

fn validate_relative_path(field: &str, value: &str) -> Result<()> {
    let path = Path::new(value);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(Error::Configuration(format!(
            "{} must be a relative path inside the stack: '{}'",
            field, value
        )));
    }
    Ok(())
}
