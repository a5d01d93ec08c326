//! Initializers create a new managed stack: they write its [`StackConfig`]
//! and project files, and return only once both are on disk.

use super::sync::write_template;
use crate::config::{RepositoryConfig, StackConfig, DEFAULT_BRANCH, DEFAULT_COMPOSE_FILE};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::git::{GitOperations, GitSource};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Built-in initializer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InitializerKind {
    Scratch,
    Template,
    TemplateRepo,
    Url,
    Git,
    Portainer,
}

impl InitializerKind {
    pub const ALL: [InitializerKind; 6] = [
        InitializerKind::Scratch,
        InitializerKind::Template,
        InitializerKind::TemplateRepo,
        InitializerKind::Url,
        InitializerKind::Git,
        InitializerKind::Portainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InitializerKind::Scratch => "scratch",
            InitializerKind::Template => "template",
            InitializerKind::TemplateRepo => "template_repo",
            InitializerKind::Url => "url",
            InitializerKind::Git => "git",
            InitializerKind::Portainer => "portainer",
        }
    }
}

impl fmt::Display for InitializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitializerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        InitializerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Configuration(format!("Unknown initializer kind: {}", s)))
    }
}

/// Named initializer parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitParams(BTreeMap<String, Value>);

impl InitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string value.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str(key).ok_or_else(|| {
            Error::Configuration(format!("Missing required parameter '{}'", key))
        })
    }

    /// Accepts JSON booleans and the strings `true`/`1`/`yes`.
    pub fn bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            _ => false,
        }
    }

    /// Object value as string pairs; non-string values use their JSON text.
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>> {
        match self.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Object(map)) => Ok(map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()),
            Some(_) => Err(Error::Configuration(format!(
                "Parameter '{}' must be an object",
                key
            ))),
        }
    }
}

impl From<serde_json::Map<String, Value>> for InitParams {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        InitParams(map.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for InitParams {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        InitParams(iter.into_iter().collect())
    }
}

/// Where and for whom an initializer runs.
#[derive(Clone)]
pub struct InitTarget {
    pub context_id: String,
    pub stack_name: String,
    pub project_dir: PathBuf,
    pub config_file: PathBuf,
    pub git_timeout: Duration,
    pub credentials: Arc<dyn CredentialStore>,
}

impl InitTarget {
    fn save(&self, config: &StackConfig) -> Result<()> {
        config.save(&self.config_file)
    }

    fn write_compose(&self, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.project_dir)?;
        let path = self.project_dir.join(DEFAULT_COMPOSE_FILE);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Creates a stack's config and files.
#[async_trait]
pub trait Initializer: Send + Sync {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig>;
}

/// Initializers by kind. Shared by every context's manager.
pub struct InitializerRegistry {
    initializers: RwLock<HashMap<InitializerKind, Arc<dyn Initializer>>>,
}

impl InitializerRegistry {
    pub fn empty() -> Self {
        InitializerRegistry {
            initializers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(InitializerKind::Scratch, Arc::new(ScratchInitializer));
        registry.register(InitializerKind::Template, Arc::new(TemplateInitializer));
        registry.register(InitializerKind::TemplateRepo, Arc::new(TemplateRepoInitializer));
        registry.register(InitializerKind::Url, Arc::new(UrlInitializer::new()));
        registry.register(InitializerKind::Git, Arc::new(GitInitializer));
        registry.register(InitializerKind::Portainer, Arc::new(PortainerInitializer));
        registry
    }

    /// Register or replace the initializer for `kind`.
    pub fn register(&self, kind: InitializerKind, initializer: Arc<dyn Initializer>) {
        self.initializers.write().insert(kind, initializer);
    }

    pub fn deregister(&self, kind: InitializerKind) -> bool {
        self.initializers.write().remove(&kind).is_some()
    }

    pub fn get(&self, kind: InitializerKind) -> Option<Arc<dyn Initializer>> {
        self.initializers.read().get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<InitializerKind> {
        let mut kinds: Vec<_> = self.initializers.read().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Run the initializer for `kind`, removing anything it left behind on failure.
    pub async fn run(
        &self,
        kind: InitializerKind,
        target: &InitTarget,
        params: &InitParams,
    ) -> Result<StackConfig> {
        let initializer = self.get(kind).ok_or_else(|| {
            Error::Configuration(format!("Initializer not registered: {}", kind))
        })?;
        if target.config_file.exists() || target.project_dir.exists() {
            return Err(Error::stack_exists(&target.stack_name));
        }

        tracing::info!(
            "initializing stack '{}' on context '{}' from {}",
            target.stack_name,
            target.context_id,
            kind
        );
        match initializer.initialize(target, params).await {
            Ok(config) => Ok(config),
            Err(e) => {
                cleanup(target);
                Err(e)
            }
        }
    }
}

impl Default for InitializerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn cleanup(target: &InitTarget) {
    if target.project_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&target.project_dir) {
            tracing::warn!("failed to remove {}: {}", target.project_dir.display(), e);
        }
    }
    if target.config_file.exists() {
        if let Err(e) = std::fs::remove_file(&target.config_file) {
            tracing::warn!("failed to remove {}: {}", target.config_file.display(), e);
        }
    }
}

/// `compose_content` written verbatim as `docker-compose.yml`.
pub struct ScratchInitializer;

#[async_trait]
impl Initializer for ScratchInitializer {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        let content = params.require_str("compose_content")?;
        target.write_compose(content)?;
        let config = StackConfig::new(&target.stack_name, InitializerKind::Scratch.as_str());
        target.save(&config)?;
        Ok(config)
    }
}

/// Inline compose object stored in the config and rendered to the stack file.
pub struct TemplateInitializer;

#[async_trait]
impl Initializer for TemplateInitializer {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        let template = match (params.get("template"), params.str("template_content")) {
            (Some(value), _) => value.clone(),
            (None, Some(text)) => serde_json::from_str(text)
                .map_err(|e| Error::Configuration(format!("Invalid template: {}", e)))?,
            (None, None) => {
                return Err(Error::Configuration(
                    "Missing required parameter 'template_content'".to_string(),
                ))
            }
        };
        if !template.is_object() {
            return Err(Error::Configuration(
                "Invalid template: expected a JSON object".to_string(),
            ));
        }

        let mut config = StackConfig::new(&target.stack_name, InitializerKind::Template.as_str());
        write_template(&template, &target.project_dir)?;
        config.template = Some(template);
        target.save(&config)?;
        Ok(config)
    }
}

/// Downloads `compose_url` into `docker-compose.yml`.
pub struct UrlInitializer {
    client: reqwest::Client,
}

impl UrlInitializer {
    pub fn new() -> Self {
        UrlInitializer {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for UrlInitializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Initializer for UrlInitializer {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        let compose_url = params.require_str("compose_url")?;
        let parsed = url::Url::parse(compose_url)
            .map_err(|e| Error::Configuration(format!("Invalid compose_url '{}': {}", compose_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "compose_url must be http or https: {}",
                compose_url
            )));
        }

        tracing::info!("downloading compose file from {}", parsed);
        let body = self
            .client
            .get(parsed)
            .timeout(target.git_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        if body.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "Compose file at {} is empty",
                compose_url
            )));
        }

        target.write_compose(&body)?;
        let mut config = StackConfig::new(&target.stack_name, InitializerKind::Url.as_str());
        config.compose_url = Some(compose_url.to_string());
        target.save(&config)?;
        Ok(config)
    }
}

/// Clones `repo_url` as the stack's project dir.
pub struct GitInitializer;

#[async_trait]
impl Initializer for GitInitializer {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        let repo_url = params.require_str("repo_url")?;
        let branch = params.str("branch").unwrap_or(DEFAULT_BRANCH);
        let private = params.bool("private");

        let mut repository = RepositoryConfig::public(repo_url, branch);
        let mut ssh_key = None;
        if private {
            repository.private = true;
            if let Some(file) = params.str("ssh_private_key") {
                let path = PathBuf::from(file);
                if !path.is_file() {
                    return Err(Error::Configuration(format!(
                        "SSH private key file {} not found",
                        path.display()
                    )));
                }
                repository.private_key_file = Some(path.clone());
                ssh_key = Some(path);
            } else if let Some(id) = params.str("ssh_private_key_id") {
                let path = target.credentials.resolve_private_key(id)?.ok_or_else(|| {
                    Error::Configuration(format!("SSH private key '{}' not found", id))
                })?;
                repository.private_key_ref = Some(id.to_string());
                ssh_key = Some(path);
            } else {
                return Err(Error::Configuration(
                    "Private repository requires an SSH private key".to_string(),
                ));
            }
        }

        let mut config = StackConfig::new(&target.stack_name, InitializerKind::Git.as_str());
        config.base_path = params.str("base_path").unwrap_or_default().to_string();
        config.repository = Some(repository);
        config.validate()?;

        let source = GitSource {
            url: repo_url.to_string(),
            branch: branch.to_string(),
            ssh_key,
        };
        GitOperations::clone_or_pull(source, target.project_dir.clone(), target.git_timeout)
            .await?;
        target.save(&config)?;
        Ok(config)
    }
}

/// Copies one template directory of a repository, substituting `{{ key }}`.
pub struct TemplateRepoInitializer;

#[async_trait]
impl Initializer for TemplateRepoInitializer {
    async fn initialize(&self, target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        let repo_url = params.require_str("repo_url")?;
        let template_name = params.require_str("template_name")?;
        let parameters = params.string_map("parameters")?;
        let branch = params.str("branch").unwrap_or(DEFAULT_BRANCH);

        let template_path = Path::new(template_name);
        if template_path.is_absolute()
            || template_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Configuration(format!(
                "Invalid template name '{}'",
                template_name
            )));
        }

        let checkout = tempfile::tempdir()?;
        let repo_dir = checkout.path().join("repo");
        let source = GitSource {
            url: repo_url.to_string(),
            branch: branch.to_string(),
            ssh_key: params.str("ssh_private_key").map(PathBuf::from),
        };
        GitOperations::clone_or_pull(source, repo_dir.clone(), target.git_timeout).await?;

        let template_dir = repo_dir.join(template_path);
        if !template_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "Template '{}' not found in {}",
                template_name, repo_url
            )));
        }

        let copied = copy_template_dir(&template_dir, &target.project_dir, &parameters)?;
        tracing::debug!("copied {} template file(s) into {}", copied, target.project_dir.display());

        let config = StackConfig::new(&target.stack_name, InitializerKind::TemplateRepo.as_str());
        target.save(&config)?;
        Ok(config)
    }
}

/// Always fails; portainer templates are not supported.
pub struct PortainerInitializer;

#[async_trait]
impl Initializer for PortainerInitializer {
    async fn initialize(&self, _target: &InitTarget, params: &InitParams) -> Result<StackConfig> {
        params.require_str("template_url")?;
        params.require_str("template_name")?;
        Err(Error::Configuration(
            "Portainer templates are not supported".to_string(),
        ))
    }
}

/// Replace every `{{ key }}` in `content`.
pub fn substitute_parameters(content: &str, parameters: &BTreeMap<String, String>) -> String {
    parameters.iter().fold(content.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{ {} }}}}", key), value)
    })
}

fn copy_template_dir(
    from: &Path,
    to: &Path,
    parameters: &BTreeMap<String, String>,
) -> Result<usize> {
    let mut copied = 0;
    let walker = walkdir::WalkDir::new(from)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let dest = to.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = std::fs::read(entry.path())?;
        match String::from_utf8(bytes) {
            Ok(text) => std::fs::write(&dest, substitute_parameters(&text, parameters))?,
            Err(raw) => std::fs::write(&dest, raw.into_bytes())?,
        }
        copied += 1;
    }
    Ok(copied)
}
