use super::{choose_action, GitSource, SyncAction};
use crate::error::{Error, Result};
use git2::{build::RepoBuilder, Cred, CredentialType, FetchOptions, RemoteCallbacks, Repository};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Git operations on local checkouts
pub struct GitOperations;

impl GitOperations {
    /// Clone into an empty or missing directory, otherwise fast-forward pull.
    ///
    /// libgit2 runs on a blocking thread. On timeout that thread is abandoned
    /// and finishes in the background.
    pub async fn clone_or_pull(
        source: GitSource,
        target: PathBuf,
        timeout: Duration,
    ) -> Result<SyncAction> {
        let action = choose_action(&target);
        let description = match action {
            SyncAction::Cloned => format!("git clone --branch {} {}", source.branch, source.url),
            SyncAction::Pulled => format!("git -C {} pull --ff-only", target.display()),
        };
        tracing::info!("{}", description);

        let task = tokio::task::spawn_blocking(move || match action {
            SyncAction::Cloned => Self::clone_repository(&source, &target),
            SyncAction::Pulled => Self::pull(&target, &source.branch, source.ssh_key.as_deref()),
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => Ok(action),
            Ok(Ok(Err(e))) => Err(Error::ExternalProcess {
                command: description,
                stderr: e.message().to_string(),
                exit_code: None,
            }),
            Ok(Err(join)) => Err(Error::ExternalProcess {
                command: description,
                stderr: join.to_string(),
                exit_code: None,
            }),
            Err(_) => Err(Error::ExternalProcess {
                command: description,
                stderr: format!("timed out after {} seconds", timeout.as_secs()),
                exit_code: None,
            }),
        }
    }

    /// Single-branch clone.
    pub fn clone_repository(source: &GitSource, target: &Path) -> std::result::Result<(), git2::Error> {
        let branch = source.branch.clone();
        let mut builder = RepoBuilder::new();
        builder.branch(&source.branch);
        builder.fetch_options(fetch_options(source.ssh_key.as_deref()));
        builder.remote_create(move |repo, name, url| {
            let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, name);
            repo.remote_with_fetch(name, url, &refspec)
        });
        builder.clone(&source.url, target)?;
        Ok(())
    }

    /// Fetch `branch` from origin and fast-forward the local branch to it.
    pub fn pull(
        repo_path: &Path,
        branch: &str,
        ssh_key: Option<&Path>,
    ) -> std::result::Result<(), git2::Error> {
        let repo = Repository::open(repo_path)?;
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(&[branch], Some(&mut fetch_options(ssh_key)), None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(git2::Error::from_str(&format!(
                "local branch '{}' has diverged from origin; refusing to merge",
                branch
            )));
        }

        let refname = format!("refs/heads/{}", branch);
        match repo.find_reference(&refname) {
            Ok(mut reference) => {
                reference.set_target(fetch_commit.id(), "fast-forward")?;
            }
            Err(_) => {
                repo.reference(&refname, fetch_commit.id(), true, "fast-forward")?;
            }
        }
        repo.set_head(&refname)?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        Ok(())
    }
}

fn fetch_options(ssh_key: Option<&Path>) -> FetchOptions<'static> {
    let ssh_key = ssh_key.map(Path::to_path_buf);
    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username, allowed| {
        // libgit2 keeps asking while credentials are rejected.
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::from_str("authentication failed"));
        }
        let user = username.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            match &ssh_key {
                Some(key) => Cred::ssh_key(user, None, key, None),
                None => Cred::ssh_key_from_agent(user),
            }
        } else {
            Cred::default()
        }
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}
