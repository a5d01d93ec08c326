use super::{ContainerStack, ContextServices, StackOutput};
use crate::compose::{compose_environment, ArgValue, ComposeArgs, ComposeEnv, ComposeInvocation};
use crate::config::{StackConfig, STACK_COMPOSE_FILE};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const DESTROY_NOOP_MESSAGE: &str =
    "COMPOSE DESTROY: No docker-specific destroy actions executed.";

/// A stack created by the agent, driven through docker compose.
#[derive(Debug)]
pub struct ManagedComposeStack {
    name: String,
    services: ContextServices,
    config: StackConfig,
    project_dir: PathBuf,
    config_file: PathBuf,
}

impl ManagedComposeStack {
    /// Load the persisted config of `name`.
    pub fn load(name: &str, services: ContextServices) -> Result<Self> {
        let config_file = services.config_file(name);
        let config = StackConfig::load(&config_file)?;
        if config.name != name {
            tracing::warn!(
                "stack config {} names '{}'; using '{}'",
                config_file.display(),
                config.name,
                name
            );
        }
        Ok(ManagedComposeStack {
            name: name.to_string(),
            project_dir: services.project_dir(name),
            config_file,
            config,
            services,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn services(&self) -> &ContextServices {
        &self.services
    }

    /// `<project>/<base_path>`
    pub fn working_dir(&self) -> PathBuf {
        self.config.working_dir(&self.project_dir)
    }

    /// The synced stack file if present, otherwise the raw compose file.
    pub fn compose_file_name(&self) -> String {
        if self.working_dir().join(STACK_COMPOSE_FILE).is_file() {
            STACK_COMPOSE_FILE.to_string()
        } else {
            self.config.compose_file.clone()
        }
    }

    /// Build the compose call for `command`.
    pub fn invocation(&self, command: &str, args: ComposeArgs) -> Result<ComposeInvocation> {
        let working_dir = self.working_dir();
        let compose_file = self.compose_file_name();
        let docker_host = self.services.endpoint.docker_host();
        let env = compose_environment(ComposeEnv {
            working_dir: &working_dir,
            project_name: &self.name,
            compose_file: &compose_file,
            docker_host: Some(&docker_host),
            docker_config: self.services.settings.docker_config.as_deref(),
        })?;

        Ok(ComposeInvocation {
            project_name: self.name.clone(),
            working_dir,
            compose_file,
            command: command.to_string(),
            args,
            env,
        })
    }

    async fn compose(&self, command: &str, args: ComposeArgs) -> Result<StackOutput> {
        let working_dir = self.working_dir();
        if !working_dir.is_dir() {
            tracing::warn!(
                "stack '{}': working dir {} not found, skipping compose {}",
                self.name,
                working_dir.display(),
                command
            );
            return Ok(StackOutput::Message(format!(
                "Stack working dir not found: {}",
                working_dir.display()
            )));
        }

        let invocation = self.invocation(command, args)?;
        tracing::info!("compose {} for stack '{}'", command, self.name);
        let output = self.services.compose.run(&invocation).await?;
        let stdout = output.into_result(invocation.display())?;
        Ok(StackOutput::Compose(stdout))
    }

    fn with_timeout(&self, mut args: ComposeArgs) -> ComposeArgs {
        args.set_default(
            "timeout",
            ArgValue::Value(self.services.settings.compose_timeout.to_string()),
        );
        args
    }

    /// `compose up`, defaulting to `--detach --build --force-recreate`.
    pub async fn up_with(&self, mut args: ComposeArgs) -> Result<StackOutput> {
        for flag in ["detach", "build", "force-recreate"] {
            args.set_default(flag, ArgValue::Flag(true));
        }
        self.compose("up", args).await
    }

    pub async fn down_with(&self, args: ComposeArgs) -> Result<StackOutput> {
        let args = self.with_timeout(args);
        self.compose("down", args).await
    }

    pub async fn ps(&self) -> Result<StackOutput> {
        self.compose("ps", ComposeArgs::new()).await
    }
}

#[async_trait]
impl ContainerStack for ManagedComposeStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn context_id(&self) -> &str {
        self.services.context_id()
    }

    fn is_managed(&self) -> bool {
        true
    }

    fn project_dir(&self) -> Option<&Path> {
        Some(&self.project_dir)
    }

    fn as_managed(&self) -> Option<&ManagedComposeStack> {
        Some(self)
    }

    async fn up(&self) -> Result<StackOutput> {
        self.up_with(ComposeArgs::new()).await
    }

    async fn down(&self) -> Result<StackOutput> {
        self.down_with(ComposeArgs::new()).await
    }

    async fn stop(&self) -> Result<StackOutput> {
        let args = self.with_timeout(ComposeArgs::new());
        self.compose("stop", args).await
    }

    async fn restart(&self) -> Result<StackOutput> {
        let args = self.with_timeout(ComposeArgs::new());
        self.compose("restart", args).await
    }

    async fn destroy(&self) -> Result<StackOutput> {
        Ok(StackOutput::Message(DESTROY_NOOP_MESSAGE.to_string()))
    }

    async fn exists(&self) -> bool {
        self.project_dir.is_dir()
    }
}
