use super::GitSource;
use crate::config::SshTarget;
use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Runs git on an engine host through `ssh`.
///
/// With agent forwarding the remote git authenticates against the
/// repository with keys from the local SSH agent.
#[derive(Debug, Clone)]
pub struct RemoteGit {
    target: SshTarget,
    timeout: Duration,
}

impl RemoteGit {
    pub fn new(target: SshTarget, timeout: Duration) -> Self {
        RemoteGit { target, timeout }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Arguments to `ssh` up to and including the destination.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-T".into(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
        ];
        if self.target.agent_forward {
            args.push("-A".into());
        }
        if let Some(identity) = &self.target.identity_file {
            args.push("-i".into());
            args.push(identity.display().to_string());
        }
        if let Some(port) = self.target.port {
            args.push("-p".into());
            args.push(port.to_string());
        }
        args.push(self.target.destination());
        args
    }

    /// Shell script that pulls a non-empty `dir` or clones into it.
    pub fn clone_or_pull_script(source: &GitSource, dir: &Path) -> String {
        let dir_q = shell_quote(&dir.display().to_string());
        let branch_q = shell_quote(&source.branch);
        let parent_q = shell_quote(
            &dir.parent()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "/".to_string()),
        );
        format!(
            "set -e; if [ -n \"$(ls -A {dir} 2>/dev/null)\" ]; then \
             echo 'pulling into {raw_dir}'; git -C {dir} pull --ff-only origin {branch}; \
             else mkdir -p {parent}; echo 'cloning into {raw_dir}'; \
             git clone --single-branch --branch {branch} {url} {dir}; fi",
            dir = dir_q,
            raw_dir = dir.display().to_string().replace('\'', ""),
            branch = branch_q,
            parent = parent_q,
            url = shell_quote(&source.url),
        )
    }

    /// Clone or pull `source` into `remote_dir` on the engine host. Returns stdout.
    pub async fn clone_or_pull(&self, source: &GitSource, remote_dir: &Path) -> Result<String> {
        let script = Self::clone_or_pull_script(source, remote_dir);
        let description = format!(
            "ssh {} git clone-or-pull {}",
            self.target.destination(),
            remote_dir.display()
        );
        tracing::info!("{}", description);
        tracing::debug!("remote script: {}", script);

        let mut args = self.ssh_args();
        args.push(script);

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("ssh")
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::ExternalProcess {
                    command: description,
                    stderr: e.to_string(),
                    exit_code: None,
                })
            }
            Err(_) => {
                return Err(Error::ExternalProcess {
                    command: description,
                    stderr: format!("timed out after {} seconds", self.timeout.as_secs()),
                    exit_code: None,
                })
            }
        };

        if !output.status.success() {
            return Err(Error::process_failed(description, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Single-quote a string for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".into()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target() -> SshTarget {
        SshTarget {
            user: Some("ops".to_string()),
            host: "edge.example.org".to_string(),
            port: Some(2222),
            identity_file: Some(PathBuf::from("/keys/edge")),
            agent_forward: true,
        }
    }

    #[test]
    fn quote_empty() {
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn quote_with_single_quote() {
        assert_eq!(shell_quote("a'b"), "'a'\\''b'");
    }

    #[test]
    fn ssh_args_forward_agent_and_port() {
        let git = RemoteGit::new(target(), Duration::from_secs(120));
        let args = git.ssh_args();
        assert!(args.contains(&"-A".to_string()));
        let i = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[i + 1], "2222");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/keys/edge");
        assert_eq!(args.last().unwrap(), "ops@edge.example.org");
    }

    #[test]
    fn no_agent_forwarding_when_disabled() {
        let mut t = target();
        t.agent_forward = false;
        t.port = None;
        let args = RemoteGit::new(t, Duration::from_secs(1)).ssh_args();
        assert!(!args.contains(&"-A".to_string()));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn script_quotes_untrusted_values() {
        let source = GitSource {
            url: "git@github.com:org/app.git".to_string(),
            branch: "release; rm -rf /".to_string(),
            ssh_key: None,
        };
        let script =
            RemoteGit::clone_or_pull_script(&source, Path::new("/srv/data/stacks/edge/app"));
        assert!(script.contains("--branch 'release; rm -rf /'"));
        assert!(script.contains("git -C '/srv/data/stacks/edge/app' pull --ff-only"));
        assert!(script.contains("mkdir -p '/srv/data/stacks/edge'"));
        assert!(script.contains("'git@github.com:org/app.git'"));
    }
}
