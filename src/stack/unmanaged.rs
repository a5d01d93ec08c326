use super::{BatchResult, ContainerStack, StackOutput};
use crate::docker::EngineClient;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const UNMANAGED_DOWN_NOTE: &str = "The unmanaged stack has been brought DOWN. Use DESTROY to permanently remove the unmanaged containers.";

#[derive(Debug, Clone, Copy)]
enum ContainerOp {
    Start,
    Stop,
    Restart,
    Remove,
}

impl ContainerOp {
    fn verb(&self) -> &'static str {
        match self {
            ContainerOp::Start => "start",
            ContainerOp::Stop => "stop",
            ContainerOp::Restart => "restart",
            ContainerOp::Remove => "remove",
        }
    }
}

/// A compose project the agent did not create, known only by its containers.
///
/// Operations act on the existing containers one by one; nothing is
/// created and nothing is persisted.
pub struct UnmanagedComposeStack {
    name: String,
    context_id: String,
    engine: Arc<dyn EngineClient>,
    project_dir: Option<PathBuf>,
}

impl UnmanagedComposeStack {
    /// Adopt the project `name`, reading its working dir from container labels.
    ///
    /// Engine failures leave the project dir unknown.
    pub async fn adopt(name: &str, context_id: &str, engine: Arc<dyn EngineClient>) -> Self {
        let project_dir = match engine.get_stack_project_dir(name).await {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("could not read project dir of unmanaged stack '{}': {}", name, e);
                None
            }
        };
        tracing::debug!(
            "unmanaged stack '{}' adopted with project dir {:?}",
            name,
            project_dir
        );
        UnmanagedComposeStack {
            name: name.to_string(),
            context_id: context_id.to_string(),
            engine,
            project_dir,
        }
    }

    async fn for_each_container(&self, op: ContainerOp) -> Result<BatchResult> {
        let containers = self.engine.list_stack_containers(&self.name).await?;
        let mut batch = BatchResult::new(op.verb());
        for container in &containers {
            let id = container.id.as_str();
            let result = match op {
                ContainerOp::Start => self.engine.start_container(id).await,
                ContainerOp::Stop => self.engine.stop_container(id).await,
                ContainerOp::Restart => self.engine.restart_container(id).await,
                ContainerOp::Remove => self.engine.remove_container(id).await,
            };
            batch.record(id, result);
        }
        tracing::info!(
            "{} unmanaged stack '{}': {}/{} container(s) ok",
            op.verb(),
            self.name,
            batch.succeeded.len(),
            batch.attempted
        );
        Ok(batch)
    }
}

#[async_trait]
impl ContainerStack for UnmanagedComposeStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn context_id(&self) -> &str {
        &self.context_id
    }

    fn is_managed(&self) -> bool {
        false
    }

    fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// Starts the existing containers; never creates new ones.
    async fn up(&self) -> Result<StackOutput> {
        Ok(StackOutput::Containers(
            self.for_each_container(ContainerOp::Start).await?,
        ))
    }

    /// Stops the containers. Removing them requires `destroy`.
    async fn down(&self) -> Result<StackOutput> {
        let mut batch = self.for_each_container(ContainerOp::Stop).await?;
        batch.note(UNMANAGED_DOWN_NOTE);
        Ok(StackOutput::Containers(batch))
    }

    async fn stop(&self) -> Result<StackOutput> {
        Ok(StackOutput::Containers(
            self.for_each_container(ContainerOp::Stop).await?,
        ))
    }

    async fn restart(&self) -> Result<StackOutput> {
        Ok(StackOutput::Containers(
            self.for_each_container(ContainerOp::Restart).await?,
        ))
    }

    /// Removes every container; the stack disappears with the last one.
    async fn destroy(&self) -> Result<StackOutput> {
        Ok(StackOutput::Containers(
            self.for_each_container(ContainerOp::Remove).await?,
        ))
    }

    async fn exists(&self) -> bool {
        match self.engine.list_stack_containers(&self.name).await {
            Ok(containers) => !containers.is_empty(),
            Err(e) => {
                tracing::debug!("exists check for '{}' failed: {}", self.name, e);
                false
            }
        }
    }
}
