use super::{volumes, ManagedComposeStack};
use crate::config::{RepositoryConfig, STACK_COMPOSE_FILE};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::git::{GitOperations, GitSource, RemoteGit};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What a sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub log: Vec<String>,
    /// The materialized `docker-compose.stack.yml`.
    pub compose_file: PathBuf,
}

/// Re-fetches a managed stack's source and materializes its stack file.
#[derive(Clone)]
pub struct SyncEngine {
    credentials: Arc<dyn CredentialStore>,
    git_timeout: Duration,
}

impl SyncEngine {
    pub fn new(credentials: Arc<dyn CredentialStore>, git_timeout: Duration) -> Self {
        SyncEngine {
            credentials,
            git_timeout,
        }
    }

    pub async fn sync_stack(&self, stack: &ManagedComposeStack) -> Result<SyncReport> {
        let config = stack.config();
        let services = stack.services();
        let project_dir = services.project_dir(&config.name);
        let working_dir = stack.working_dir();
        let mut log = Vec::new();

        match &config.repository {
            Some(repo) => {
                let source = self.git_source(repo)?;
                if services.endpoint.is_local() {
                    let action =
                        GitOperations::clone_or_pull(source, project_dir.clone(), self.git_timeout)
                            .await?;
                    log.push(format!("Repository {} into {}", action, project_dir.display()));
                } else {
                    self.sync_remote(stack, source, &project_dir, &mut log).await?;
                }
            }
            None => {
                log.push("No repository configured".to_string());
                if !working_dir.exists() {
                    std::fs::create_dir_all(&working_dir)?;
                    log.push(format!("Created project directory {}", working_dir.display()));
                }
            }
        }

        let compose_file = working_dir.join(STACK_COMPOSE_FILE);
        if let Some(template) = &config.template {
            write_template(template, &working_dir)?;
            log.push(format!("Wrote inline template to {}", compose_file.display()));
        } else {
            let raw = working_dir.join(&config.compose_file);
            if !raw.is_file() {
                return Err(Error::Configuration(format!(
                    "No sync source for stack '{}': no repository, template or {} in {}",
                    config.name,
                    config.compose_file,
                    working_dir.display()
                )));
            }
            let prefix = services.volume_prefix(config);
            let count = volumes::rewrite_compose_file(&raw, &compose_file, &prefix)?;
            log.push(format!(
                "Parsed {} into {} ({} volume(s) rooted at {})",
                config.compose_file,
                STACK_COMPOSE_FILE,
                count,
                prefix.display()
            ));
        }

        tracing::info!("synced stack '{}' on context '{}'", config.name, services.context_id());
        Ok(SyncReport { log, compose_file })
    }

    /// Clone/pull on the engine host, then locally so compose can read the file.
    async fn sync_remote(
        &self,
        stack: &ManagedComposeStack,
        source: GitSource,
        project_dir: &Path,
        log: &mut Vec<String>,
    ) -> Result<()> {
        let services = stack.services();
        let target = services.context.ssh_target()?.ok_or_else(|| {
            Error::Configuration(format!(
                "Context '{}' has no SSH target for remote git",
                services.context_id()
            ))
        })?;
        if source.ssh_key.is_some() && !target.agent_forward {
            return Err(Error::Configuration(format!(
                "Private repositories on remote context '{}' need SSH agent forwarding",
                services.context_id()
            )));
        }

        let remote_dir = services.host_stack_dir(&stack.config().name);
        let remote = RemoteGit::new(target, self.git_timeout);
        let out = remote.clone_or_pull(&source, &remote_dir).await?;
        log.extend(out.lines().map(str::to_string));
        log.push(format!(
            "Repository synced on {} into {}",
            remote.target().destination(),
            remote_dir.display()
        ));

        let action =
            GitOperations::clone_or_pull(source, project_dir.to_path_buf(), self.git_timeout)
                .await?;
        log.push(format!("Repository {} into {}", action, project_dir.display()));
        Ok(())
    }

    /// Resolve what to fetch. Private repositories must have a key on disk
    /// before any network I/O happens.
    pub fn git_source(&self, repo: &RepositoryConfig) -> Result<GitSource> {
        if repo.url.trim().is_empty() {
            return Err(Error::Configuration(
                "Repository URL not provided".to_string(),
            ));
        }
        Ok(GitSource {
            url: repo.url.clone(),
            branch: repo.branch.clone(),
            ssh_key: self.resolve_ssh_key(repo)?,
        })
    }

    pub fn resolve_ssh_key(&self, repo: &RepositoryConfig) -> Result<Option<PathBuf>> {
        if !repo.private {
            return Ok(None);
        }
        if let Some(file) = &repo.private_key_file {
            if !file.is_file() {
                return Err(Error::Configuration(format!(
                    "SSH private key file {} not found",
                    file.display()
                )));
            }
            return Ok(Some(file.clone()));
        }
        match repo.private_key_ref.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match self.credentials.resolve_private_key(id)? {
                Some(path) => Ok(Some(path)),
                None => Err(Error::Configuration(format!(
                    "SSH private key '{}' not found",
                    id
                ))),
            },
            None => Err(Error::Configuration(
                "Private repository requires an SSH private key".to_string(),
            )),
        }
    }
}

/// Write an inline compose template as `docker-compose.stack.yml`.
pub(crate) fn write_template(template: &serde_json::Value, working_dir: &Path) -> Result<PathBuf> {
    if !template.is_object() {
        return Err(Error::Configuration(
            "Inline template must be a compose object".to_string(),
        ));
    }
    std::fs::create_dir_all(working_dir)?;
    let path = working_dir.join(STACK_COMPOSE_FILE);
    std::fs::write(&path, serde_yaml::to_string(template)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::FileCredentialStore;

    fn engine(keys: &Path) -> SyncEngine {
        SyncEngine::new(
            Arc::new(FileCredentialStore::new(keys)),
            Duration::from_secs(5),
        )
    }

    fn private_repo() -> RepositoryConfig {
        RepositoryConfig {
            private: true,
            ..RepositoryConfig::public("git@example.org:org/app.git", "main")
        }
    }

    #[test]
    fn private_repo_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = engine(dir.path()).git_source(&private_repo()).unwrap_err();
        assert!(err.to_string().contains("requires an SSH private key"));
    }

    #[test]
    fn private_repo_with_unknown_key_ref_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RepositoryConfig {
            private_key_ref: Some("deploy".to_string()),
            ..private_repo()
        };
        let err = engine(dir.path()).git_source(&repo).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("'deploy' not found")));
    }

    #[test]
    fn private_repo_resolves_stored_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let key = store.write("deploy", "KEY").unwrap();
        let repo = RepositoryConfig {
            private_key_ref: Some("deploy".to_string()),
            ..private_repo()
        };
        let source = engine(dir.path()).git_source(&repo).unwrap();
        assert_eq!(source.ssh_key, Some(key));
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RepositoryConfig {
            private_key_file: Some(dir.path().join("nope")),
            ..private_repo()
        };
        assert!(engine(dir.path()).git_source(&repo).is_err());
    }

    #[test]
    fn public_repo_needs_url_only() {
        let dir = tempfile::tempdir().unwrap();
        let sync = engine(dir.path());
        assert_eq!(
            sync.git_source(&RepositoryConfig::public("https://example.org/r.git", "dev"))
                .unwrap()
                .ssh_key,
            None
        );
        let err = sync
            .git_source(&RepositoryConfig::public("", "main"))
            .unwrap_err();
        assert!(err.to_string().contains("Repository URL not provided"));
    }

    #[test]
    fn template_must_be_object() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_template(&serde_json::json!(["x"]), dir.path()).is_err());
        let path = write_template(
            &serde_json::json!({"services": {"web": {"image": "nginx"}}}),
            dir.path(),
        )
        .unwrap();
        let yaml = std::fs::read_to_string(path).unwrap();
        assert!(yaml.contains("image: nginx"));
    }
}
