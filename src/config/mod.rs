//! Configuration for the agent.
//!
//! - `settings` - process-wide [`Settings`] from environment variables
//! - `context` - Docker contexts and endpoint resolution
//! - `stack` - persisted per-stack [`StackConfig`]
//! - `env_loader` - `.env` parsing for compose invocations

pub mod env_loader;

mod context;
mod settings;
mod stack;

pub use context::*;
pub use settings::*;
pub use stack::*;

use std::path::{Path, PathBuf};

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s == "~" {
        dirs::home_dir().unwrap_or_else(|| path.to_path_buf())
    } else if let Some(rest) = s.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_subpath() {
        let result = expand_tilde(Path::new("~/.ssh/id_ed25519"));
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join(".ssh/id_ed25519"));
    }

    #[test]
    fn expand_tilde_leaves_other_paths() {
        assert_eq!(expand_tilde(Path::new("data")), PathBuf::from("data"));
        assert_eq!(expand_tilde(Path::new("/srv/data")), PathBuf::from("/srv/data"));
        assert_eq!(expand_tilde(Path::new("~user/x")), PathBuf::from("~user/x"));
    }
}
