//! Fetching stack sources from git.
//!
//! [`GitOperations`] works on the local filesystem through libgit2;
//! [`RemoteGit`] runs the git CLI on an engine host over SSH.

mod local;
mod remote;

pub use local::GitOperations;
pub use remote::{shell_quote, RemoteGit};

use std::path::{Path, PathBuf};

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub url: String,
    pub branch: String,
    /// SSH private key for the repository.
    pub ssh_key: Option<PathBuf>,
}

/// Which of clone or pull ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Pulled,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncAction::Cloned => write!(f, "cloned"),
            SyncAction::Pulled => write!(f, "pulled"),
        }
    }
}

/// A directory that exists and has at least one entry gets pulled; anything
/// else gets cloned.
pub fn choose_action(dir: &Path) -> SyncAction {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                SyncAction::Pulled
            } else {
                SyncAction::Cloned
            }
        }
        Err(_) => SyncAction::Cloned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_depends_on_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("repo");
        assert_eq!(choose_action(&target), SyncAction::Cloned);
        std::fs::create_dir(&target).unwrap();
        assert_eq!(choose_action(&target), SyncAction::Cloned);
        std::fs::write(target.join("README.md"), "x").unwrap();
        assert_eq!(choose_action(&target), SyncAction::Pulled);
    }
}
