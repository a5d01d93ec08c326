//! docker compose invocation.
//!
//! A [`ComposeInvocation`] is a fully described compose call (project,
//! working dir, file, subcommand, flags and a clean environment).
//! [`ComposeProcessRunner`] executes it; [`ComposeCli`] is the production
//! runner.

mod args;
mod cli;

pub use args::{ArgValue, ComposeArgs};
pub use cli::{ComposeCli, ComposeCommand};

use crate::config::env_loader;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One compose call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInvocation {
    pub project_name: String,
    pub working_dir: PathBuf,
    pub compose_file: String,
    /// Subcommand: `up`, `down`, `stop`, `restart`, `ps`.
    pub command: String,
    pub args: ComposeArgs,
    /// Complete environment of the subprocess.
    pub env: BTreeMap<String, String>,
}

impl ComposeInvocation {
    /// Arguments after the compose program, i.e. global flags, subcommand, subcommand flags.
    pub fn command_args(&self, compose: ComposeCommand) -> Vec<String> {
        let mut global = ComposeArgs::new()
            .value("project-name", &self.project_name)
            .value("project-directory", self.working_dir.display())
            .value("file", &self.compose_file);
        if compose.supports_progress() {
            global = global.value("progress", "plain");
        }

        let mut args = global.to_cmdargs();
        args.push(self.command.clone());
        args.extend(self.args.to_cmdargs());
        args
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        format!(
            "docker compose {}",
            self.command_args(ComposeCommand::V2).join(" ")
        )
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout on success, otherwise an `ExternalProcess` error carrying stderr.
    pub fn into_result(self, command: impl Into<String>) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(Error::ExternalProcess {
                command: command.into(),
                stderr: self.stderr.trim().to_string(),
                exit_code: self.exit_code,
            })
        }
    }
}

impl From<std::process::Output> for ProcessOutput {
    fn from(output: std::process::Output) -> Self {
        ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }
    }
}

/// Executes compose invocations.
#[async_trait]
pub trait ComposeProcessRunner: Send + Sync {
    /// Run to completion. A non-zero exit is reported in the output, not as `Err`.
    async fn run(&self, invocation: &ComposeInvocation) -> Result<ProcessOutput>;
}

/// Inputs for [`compose_environment`].
#[derive(Debug, Clone, Copy)]
pub struct ComposeEnv<'a> {
    pub working_dir: &'a Path,
    pub project_name: &'a str,
    pub compose_file: &'a str,
    pub docker_host: Option<&'a str>,
    pub docker_config: Option<&'a Path>,
}

/// Clean environment for a compose subprocess.
///
/// Only `PATH` and `HOME` are inherited; variables from `<workdir>/.env`
/// override the computed ones.
pub fn compose_environment(env: ComposeEnv<'_>) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for inherited in ["PATH", "HOME"] {
        if let Ok(value) = std::env::var(inherited) {
            vars.insert(inherited.to_string(), value);
        }
    }
    if let Some(config) = env.docker_config {
        vars.insert("DOCKER_CONFIG".to_string(), config.display().to_string());
    }
    if let Some(host) = env.docker_host {
        vars.insert("DOCKER_HOST".to_string(), host.to_string());
    }
    let working_dir = env.working_dir.display().to_string();
    vars.insert("COMPOSE_PROJECT_DIRECTORY".to_string(), working_dir.clone());
    vars.insert("COMPOSE_PROJECT_NAME".to_string(), env.project_name.to_string());
    vars.insert("COMPOSE_FILE".to_string(), env.compose_file.to_string());
    vars.insert("PWD".to_string(), working_dir);

    vars.extend(env_loader::load_optional_env_file(env.working_dir)?);
    Ok(vars)
}
