use super::{expand_tilde, Settings};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Socket used by the built-in `local` and `default` contexts.
pub const LOCAL_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Context ids that resolve to the local engine without configuration.
pub const BUILTIN_LOCAL_CONTEXTS: [&str; 2] = ["local", "default"];

/// A named Docker engine endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    /// Endpoint URI: `unix://...`, `tcp://host:port` or `ssh://user@host:port`.
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,
    /// Data directory as seen by this context's docker daemon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_home: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_agent_forward")]
    pub agent_forward: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_data_dir: Option<PathBuf>,
}

fn default_agent_forward() -> bool {
    true
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            user: None,
            port: None,
            identity_file: None,
            agent_forward: true,
            remote_data_dir: None,
        }
    }
}

/// Where an engine lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointDescriptor {
    Local { socket: PathBuf },
    Tcp { url: String },
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
    },
}

impl EndpointDescriptor {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix("unix://") {
            // `unix://var/run/docker.sock` shows up in the wild; treat it as absolute.
            let socket = if rest.starts_with('/') {
                PathBuf::from(rest)
            } else {
                Path::new("/").join(rest)
            };
            return Ok(EndpointDescriptor::Local { socket });
        }
        if uri.starts_with('/') {
            return Ok(EndpointDescriptor::Local {
                socket: PathBuf::from(uri),
            });
        }

        let parsed = url::Url::parse(uri)
            .map_err(|e| Error::Configuration(format!("Invalid docker host '{}': {}", uri, e)))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Configuration(format!("Docker host '{}' has no hostname", uri)))?;

        match parsed.scheme() {
            "tcp" | "http" | "https" => Ok(EndpointDescriptor::Tcp {
                url: uri.to_string(),
            }),
            "ssh" => Ok(EndpointDescriptor::Ssh {
                user: Some(parsed.username())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
                host: host.to_string(),
                port: parsed.port(),
            }),
            other => Err(Error::Configuration(format!(
                "Unsupported docker host scheme '{}' in '{}'",
                other, uri
            ))),
        }
    }

    /// Value for `docker --host` / `DOCKER_HOST`.
    pub fn docker_host(&self) -> String {
        match self {
            EndpointDescriptor::Local { socket } => format!("unix://{}", socket.display()),
            EndpointDescriptor::Tcp { url } => url.clone(),
            EndpointDescriptor::Ssh { user, host, port } => {
                let mut s = String::from("ssh://");
                if let Some(user) = user {
                    s.push_str(user);
                    s.push('@');
                }
                s.push_str(host);
                if let Some(port) = port {
                    s.push_str(&format!(":{}", port));
                }
                s
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, EndpointDescriptor::Local { .. })
    }

    /// Hostname of a remote engine.
    pub fn remote_host(&self) -> Option<String> {
        match self {
            EndpointDescriptor::Local { .. } => None,
            EndpointDescriptor::Tcp { url } => url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string)),
            EndpointDescriptor::Ssh { host, .. } => Some(host.clone()),
        }
    }
}

/// SSH login used to run git on a remote engine host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub agent_forward: bool,
}

impl SshTarget {
    /// `user@host` or `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl Context {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Context {
            id: id.into(),
            host: host.into(),
            ssh: None,
            data_home: None,
        }
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = Some(ssh);
        self
    }

    pub fn with_data_home(mut self, data_home: impl Into<PathBuf>) -> Self {
        self.data_home = Some(data_home.into());
        self
    }

    pub fn endpoint(&self) -> Result<EndpointDescriptor> {
        EndpointDescriptor::parse(&self.host)
    }

    /// SSH login for the engine host; `None` for local engines and for
    /// `tcp://` engines without an `ssh` section.
    ///
    /// Values in [`SshConfig`] override the user and port of an `ssh://` URI.
    pub fn ssh_target(&self) -> Result<Option<SshTarget>> {
        let endpoint = self.endpoint()?;
        let (uri_user, uri_port) = match &endpoint {
            EndpointDescriptor::Local { .. } => return Ok(None),
            EndpointDescriptor::Ssh { user, port, .. } => (user.clone(), *port),
            EndpointDescriptor::Tcp { .. } if self.ssh.is_none() => return Ok(None),
            EndpointDescriptor::Tcp { .. } => (None, None),
        };
        let Some(host) = endpoint.remote_host() else {
            return Ok(None);
        };
        let ssh = self.ssh.clone().unwrap_or_default();

        Ok(Some(SshTarget {
            user: ssh.user.or(uri_user),
            host,
            // The engine port of a tcp:// URI is not an SSH port.
            port: ssh.port.or(uri_port),
            identity_file: ssh.identity_file.map(|p| expand_tilde(&p)),
            agent_forward: ssh.agent_forward,
        }))
    }

    /// Data directory on the engine host, falling back to `default`.
    pub fn remote_data_dir(&self, default: &Path) -> PathBuf {
        self.ssh
            .as_ref()
            .and_then(|s| s.remote_data_dir.clone())
            .or_else(|| self.data_home.clone())
            .unwrap_or_else(|| default.to_path_buf())
    }

    fn builtin_local(id: &str) -> Self {
        Context::new(id, format!("unix://{}", LOCAL_DOCKER_SOCKET))
    }
}

/// Maps context ids to engine endpoints.
///
/// The list is loaded once; [`add`](Self::add) and [`remove`](Self::remove)
/// change it for later lookups without touching existing engine clients.
#[derive(Debug)]
pub struct ContextResolver {
    contexts: RwLock<Vec<Context>>,
    file: Option<PathBuf>,
}

impl ContextResolver {
    pub fn new(contexts: Vec<Context>) -> Self {
        ContextResolver {
            contexts: RwLock::new(contexts),
            file: None,
        }
    }

    /// Load from the contexts file, falling back to environment variables
    /// when the file is missing or lists nothing.
    pub fn load(settings: &Settings) -> Result<Self> {
        Self::load_with(settings, |key| std::env::var(key).ok())
    }

    pub fn load_with(settings: &Settings, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut contexts = read_contexts_file(&settings.context_file)?;
        if contexts.is_empty() {
            contexts = contexts_from_lookup(lookup);
        }
        tracing::debug!(
            "loaded {} context(s) ({})",
            contexts.len(),
            settings.context_file.display()
        );
        Ok(ContextResolver {
            contexts: RwLock::new(contexts),
            file: Some(settings.context_file.clone()),
        })
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.contexts.read().clone()
    }

    /// Look up a context; `local` and `default` exist even when not listed.
    pub fn get(&self, id: &str) -> Result<Context> {
        if let Some(ctx) = self.contexts.read().iter().find(|c| c.id == id) {
            return Ok(ctx.clone());
        }
        if BUILTIN_LOCAL_CONTEXTS.contains(&id) {
            return Ok(Context::builtin_local(id));
        }
        Err(Error::context_not_found(id))
    }

    pub fn resolve(&self, id: &str) -> Result<EndpointDescriptor> {
        self.get(id)?.endpoint()
    }

    pub fn add(&self, context: Context, write: bool) -> Result<()> {
        context.endpoint()?;
        {
            let mut contexts = self.contexts.write();
            if contexts.iter().any(|c| c.id == context.id) {
                return Err(Error::AlreadyExists {
                    kind: "Context",
                    name: context.id,
                });
            }
            tracing::info!("adding context '{}' ({})", context.id, context.host);
            contexts.push(context);
        }
        if write {
            self.save()?;
        }
        Ok(())
    }

    /// Returns whether a context was removed.
    pub fn remove(&self, id: &str, write: bool) -> Result<bool> {
        let removed = {
            let mut contexts = self.contexts.write();
            let before = contexts.len();
            contexts.retain(|c| c.id != id);
            contexts.len() != before
        };
        if removed && write {
            self.save()?;
        }
        Ok(removed)
    }

    /// Write the current list back to the contexts file.
    pub fn save(&self) -> Result<PathBuf> {
        let file = self.file.as_ref().ok_or_else(|| {
            Error::Configuration("Context list was not loaded from a file".to_string())
        })?;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.contexts.read())?;
        std::fs::write(file, json)?;
        Ok(file.clone())
    }
}

fn read_contexts_file(path: &Path) -> Result<Vec<Context>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|e| {
        Error::Configuration(format!(
            "Failed to parse contexts file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Read `STACK_AGENT_CONTEXT_<n>` / `STACK_AGENT_CONTEXT_<n>_HOST` pairs,
/// stopping at the first gap.
pub fn contexts_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Vec<Context> {
    let mut contexts = Vec::new();
    for i in 0.. {
        let Some(id) = lookup(&format!("STACK_AGENT_CONTEXT_{}", i)).filter(|v| !v.is_empty())
        else {
            break;
        };
        let Some(host) = lookup(&format!("STACK_AGENT_CONTEXT_{}_HOST", i)) else {
            break;
        };
        tracing::debug!("context '{}' from environment ({})", id, host);
        contexts.push(Context::new(id, host));
    }
    contexts
}
