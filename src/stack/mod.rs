//! Stack lifecycle.
//!
//! A stack is a compose project on one context. Managed stacks were created
//! by the agent and have a persisted [`StackConfig`]; unmanaged stacks are
//! compose projects found on the engine by their project label.
//!
//! [`StacksManager`] is the entry point; [`StacksManagerStore`] owns one
//! manager per context.

mod batch;
mod initializer;
mod managed;
mod manager;
mod store;
mod sync;
mod unmanaged;
pub mod volumes;

pub use batch::BatchResult;
pub use initializer::{
    substitute_parameters, InitParams, InitTarget, Initializer, InitializerKind,
    InitializerRegistry,
};
pub use managed::{ManagedComposeStack, DESTROY_NOOP_MESSAGE};
pub use manager::{DestroyReport, StacksManager};
pub use store::{SharedManager, StacksManagerStore};
pub use sync::{SyncEngine, SyncReport};
pub use unmanaged::{UnmanagedComposeStack, UNMANAGED_DOWN_NOTE};

use crate::compose::ComposeProcessRunner;
use crate::config::{Context, EndpointDescriptor, Settings, StackConfig};
use crate::credentials::CredentialStore;
use crate::docker::{ContainerInfo, EngineClient};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOutput {
    /// stdout of a successful compose call.
    Compose(String),
    /// Per-container results of an unmanaged stack operation.
    Containers(BatchResult),
    Message(String),
}

impl fmt::Display for StackOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackOutput::Compose(out) => write!(f, "{}", out.trim_end()),
            StackOutput::Containers(batch) => write!(f, "{}", batch),
            StackOutput::Message(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    /// No containers.
    Created,
    /// Containers exist, none running.
    Idle,
    Running,
}

impl StackStatus {
    pub fn from_containers(containers: &[ContainerInfo]) -> Self {
        if containers.iter().any(ContainerInfo::is_running) {
            StackStatus::Running
        } else if containers.is_empty() {
            StackStatus::Created
        } else {
            StackStatus::Idle
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackStatus::Created => write!(f, "created"),
            StackStatus::Idle => write!(f, "idle"),
            StackStatus::Running => write!(f, "running"),
        }
    }
}

/// List and describe view of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSummary {
    pub name: String,
    pub context_id: String,
    pub managed: bool,
    pub project_dir: Option<PathBuf>,
    pub status: StackStatus,
    pub containers: Vec<ContainerInfo>,
}

impl StackSummary {
    pub fn new(stack: &dyn ContainerStack, containers: Vec<ContainerInfo>) -> Self {
        StackSummary {
            name: stack.name().to_string(),
            context_id: stack.context_id().to_string(),
            managed: stack.is_managed(),
            project_dir: stack.project_dir().map(Path::to_path_buf),
            status: StackStatus::from_containers(&containers),
            containers,
        }
    }
}

/// Lifecycle of one stack.
///
/// ```text
/// UNINITIALIZED -(init)-> STOPPED -(up)-> RUNNING -(stop)-> STOPPED
///                                  RUNNING -(restart)-> RUNNING
/// any -(destroy)-> REMOVED
/// ```
#[async_trait]
pub trait ContainerStack: Send + Sync {
    fn name(&self) -> &str;

    fn context_id(&self) -> &str;

    fn is_managed(&self) -> bool;

    /// Project directory on this machine, if known.
    fn project_dir(&self) -> Option<&Path>;

    /// The managed variant, for callers that need its config.
    fn as_managed(&self) -> Option<&ManagedComposeStack> {
        None
    }

    async fn up(&self) -> Result<StackOutput>;

    async fn down(&self) -> Result<StackOutput>;

    async fn stop(&self) -> Result<StackOutput>;

    async fn restart(&self) -> Result<StackOutput>;

    /// Remove engine-side resources. Filesystem cleanup belongs to the manager.
    async fn destroy(&self) -> Result<StackOutput>;

    /// Never fails; engine errors count as "does not exist".
    async fn exists(&self) -> bool;
}

/// Collaborators shared by every stack of one context.
#[derive(Clone)]
pub struct ContextServices {
    pub settings: Arc<Settings>,
    pub context: Context,
    pub endpoint: EndpointDescriptor,
    pub engine: Arc<dyn EngineClient>,
    pub compose: Arc<dyn ComposeProcessRunner>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl ContextServices {
    pub fn context_id(&self) -> &str {
        &self.context.id
    }

    /// Data directory as seen by the engine host.
    pub fn host_data_dir(&self) -> PathBuf {
        if self.endpoint.is_local() {
            self.context
                .data_home
                .clone()
                .unwrap_or_else(|| self.settings.data_home.clone())
        } else {
            self.context.remote_data_dir(&self.settings.data_home)
        }
    }

    /// `<host data dir>/stacks/<ctx>/<name>`
    pub fn host_stack_dir(&self, name: &str) -> PathBuf {
        self.host_data_dir()
            .join("stacks")
            .join(self.context_id())
            .join(name)
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.settings.stack_project_dir(self.context_id(), name)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.settings.stack_config_file(self.context_id(), name)
    }

    /// Prefix for relative bind mounts of a stack.
    pub fn volume_prefix(&self, config: &StackConfig) -> PathBuf {
        config.working_dir(&self.host_stack_dir(&config.name))
    }
}

impl fmt::Debug for ContextServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextServices")
            .field("context", &self.context)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn container(state: &str) -> ContainerInfo {
        ContainerInfo {
            id: "c".to_string(),
            name: "c".to_string(),
            image: "i".to_string(),
            state: state.to_string(),
            status: String::new(),
            labels: HashMap::new(),
        }
    }

    #[test]
    fn status_from_containers() {
        assert_eq!(StackStatus::from_containers(&[]), StackStatus::Created);
        assert_eq!(
            StackStatus::from_containers(&[container("exited"), container("created")]),
            StackStatus::Idle
        );
        assert_eq!(
            StackStatus::from_containers(&[container("exited"), container("running")]),
            StackStatus::Running
        );
        assert_eq!(StackStatus::Idle.to_string(), "idle");
    }
}
