use std::fmt;
use std::time::Duration;

/// Structured error type for Docker CLI operations.
#[derive(Debug)]
pub enum DockerError {
    /// Docker command timed out.
    Timeout { command: String, timeout: Duration },

    /// Docker command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// Docker binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// Container doesn't exist (parsed from "No such container" stderr).
    ContainerNotFound { container: String },

    /// The command succeeded but its output could not be understood.
    UnexpectedOutput { command: String, detail: String },
}

impl DockerError {
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        DockerError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// Create a command-failed error from an `std::process::Output`.
    ///
    /// "No such container" on stderr is mapped to [`DockerError::ContainerNotFound`].
    pub fn failed(cmd: impl Into<String>, container: &str, output: &std::process::Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("No such container") {
            return DockerError::ContainerNotFound {
                container: container.to_string(),
            };
        }
        DockerError::CommandFailed {
            command: cmd.into(),
            stderr,
            exit_code: output.status.code(),
        }
    }

    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        DockerError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }

    pub fn unexpected_output(cmd: impl Into<String>, detail: impl Into<String>) -> Self {
        DockerError::UnexpectedOutput {
            command: cmd.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::Timeout { command, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    command,
                    timeout.as_secs()
                )
            }
            DockerError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                if let Some(code) = exit_code {
                    write!(f, "'{}' failed (exit code {}): {}", command, code, stderr)
                } else {
                    write!(f, "'{}' failed: {}", command, stderr)
                }
            }
            DockerError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
            DockerError::ContainerNotFound { container } => {
                write!(f, "No such container: {}", container)
            }
            DockerError::UnexpectedOutput { command, detail } => {
                write!(f, "Unexpected output from '{}': {}", command, detail)
            }
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
