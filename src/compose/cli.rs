use super::{ComposeInvocation, ComposeProcessRunner, ProcessOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;

/// Docker Compose command type (v1 or v2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    V2, // docker compose
    V1, // docker-compose
}

/// Global cache for compose command detection
static COMPOSE_COMMAND: OnceCell<ComposeCommand> = OnceCell::const_new();

impl ComposeCommand {
    /// Detect which docker compose command is available
    async fn detect() -> Result<ComposeCommand> {
        // Try docker compose (v2) first
        let v2_check = tokio::process::Command::new("docker")
            .args(["compose", "version"])
            .output()
            .await;

        if let Ok(output) = v2_check {
            if output.status.success() {
                return Ok(ComposeCommand::V2);
            }
        }

        let v1_check = tokio::process::Command::new("docker-compose")
            .args(["--version"])
            .output()
            .await;

        if let Ok(output) = v1_check {
            if output.status.success() {
                tracing::warn!("docker compose v2 not available, falling back to docker-compose");
                return Ok(ComposeCommand::V1);
            }
        }

        Err(Error::Configuration(
            "Neither 'docker compose' (v2) nor 'docker-compose' (v1) found. Please install Docker Compose.".to_string(),
        ))
    }

    /// Get the compose command (cached)
    pub async fn get() -> Result<ComposeCommand> {
        COMPOSE_COMMAND
            .get_or_try_init(|| async { Self::detect().await })
            .await
            .copied()
    }

    /// Get command and args for running compose
    pub fn command_and_args(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ComposeCommand::V2 => ("docker", &["compose"]),
            ComposeCommand::V1 => ("docker-compose", &[]),
        }
    }

    /// `--progress` is a v2 global option.
    pub fn supports_progress(&self) -> bool {
        matches!(self, ComposeCommand::V2)
    }
}

/// Runs compose invocations as local subprocesses.
///
/// Remote engines are reached through `DOCKER_HOST` in the invocation
/// environment, so the compose binary always runs on this machine.
#[derive(Debug, Clone, Default)]
pub struct ComposeCli {
    command: Option<ComposeCommand>,
}

impl ComposeCli {
    /// Runner that detects the compose flavour on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner pinned to one compose flavour.
    pub fn with_command(command: ComposeCommand) -> Self {
        ComposeCli {
            command: Some(command),
        }
    }
}

#[async_trait]
impl ComposeProcessRunner for ComposeCli {
    async fn run(&self, invocation: &ComposeInvocation) -> Result<ProcessOutput> {
        let compose = match self.command {
            Some(command) => command,
            None => ComposeCommand::get().await?,
        };
        let (program, base_args) = compose.command_and_args();
        let args = invocation.command_args(compose);
        let command_line = format!("{} {} {}", program, base_args.join(" "), args.join(" "));
        tracing::debug!(cwd = %invocation.working_dir.display(), "running {}", command_line);

        let output = tokio::process::Command::new(program)
            .args(base_args)
            .args(&args)
            .current_dir(&invocation.working_dir)
            .env_clear()
            .envs(&invocation.env)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalProcess {
                command: command_line.clone(),
                stderr: e.to_string(),
                exit_code: None,
            })?;

        let output = ProcessOutput::from(output);
        if !output.success() {
            tracing::warn!(
                "'{}' exited with {:?}: {}",
                command_line,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_args_per_flavour() {
        assert_eq!(
            ComposeCommand::V2.command_and_args(),
            ("docker", &["compose"][..])
        );
        assert_eq!(
            ComposeCommand::V1.command_and_args(),
            ("docker-compose", &[][..])
        );
    }
}
