// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::docker::DockerError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("{kind} not found: {name}")]
    #[diagnostic(
        code(stack_agent::not_found),
        help("List known contexts with `stack-agent contexts` and stacks with `stack-agent list`")
    )]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    #[diagnostic(code(stack_agent::already_exists))]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(stack_agent::configuration))]
    Configuration(String),

    #[error("'{command}' failed{}: {stderr}",
        .exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default()
    )]
    #[diagnostic(
        code(stack_agent::external_process),
        help("The captured stderr above comes from the external tool; fix the cause and retry")
    )]
    ExternalProcess {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("{failed} of {attempted} container operations failed:\n{}",
        .errors.iter().map(|(id, e)| format!("  - {}: {}", id, e)).collect::<Vec<_>>().join("\n")
    )]
    #[diagnostic(code(stack_agent::partial_failure))]
    PartialFailure {
        attempted: usize,
        failed: usize,
        errors: Vec<(String, String)>,
    },

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(stack_agent::docker),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn context_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "Context",
            name: id.into(),
        }
    }

    pub fn stack_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "Stack",
            name: name.into(),
        }
    }

    pub fn stack_exists(name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind: "Stack",
            name: name.into(),
        }
    }

    /// Build an `ExternalProcess` error from a finished subprocess.
    pub fn process_failed(command: impl Into<String>, output: &std::process::Output) -> Self {
        Error::ExternalProcess {
            command: command.into(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::NotFound { kind: "Context", name } => Some(format!(
                "Add context '{}' to contexts.json or set STACK_AGENT_CONTEXT_<n>/STACK_AGENT_CONTEXT_<n>_HOST",
                name
            )),
            Error::AlreadyExists { name, .. } => Some(format!(
                "Pick another name or remove the existing stack with: stack-agent destroy {}",
                name
            )),
            Error::Configuration(msg) if msg.contains("private key") => Some(
                "Store the key under <data_dir>/config/keys/<id>.key or pass an existing key path"
                    .to_string(),
            ),
            Error::ExternalProcess { command, .. } if command.starts_with("git") => Some(
                "Check the repository URL, branch and SSH credentials".to_string(),
            ),
            Error::ExternalProcess { command, .. } if command.contains("compose") => Some(
                "Validate the compose file with: docker compose config".to_string(),
            ),
            Error::Docker(_) => Some("Check that Docker is running: docker ps".to_string()),
            _ => None,
        }
    }
}
