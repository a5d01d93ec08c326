//! SSH private key storage.

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const KEY_FILE_SUFFIX: &str = ".key";

/// Lookup of stored SSH private keys by id.
pub trait CredentialStore: Send + Sync {
    /// Path of the key file for `id`, if one is stored.
    fn resolve_private_key(&self, id: &str) -> Result<Option<PathBuf>>;
}

/// Keys stored as `<dir>/<id>.key`, normally `<data_dir>/config/keys`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCredentialStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(Error::Configuration(format!("Invalid private key id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}{}", id, KEY_FILE_SUFFIX)))
    }

    /// Ids of all stored keys, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(KEY_FILE_SUFFIX))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Store a key readable only by the owner. Returns the key path.
    pub fn write(&self, id: &str, content: &str) -> Result<PathBuf> {
        let path = self.key_path(id)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        // `mode` only applies to new files; tighten a replaced key before writing.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(format!("{}\n", content.trim()).as_bytes())?;
        tracing::info!("stored private key '{}'", id);
        Ok(path)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.key_path(id)?;
        if !path.exists() {
            return Err(Error::NotFound {
                kind: "Private key",
                name: id.to_string(),
            });
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn resolve_private_key(&self, id: &str) -> Result<Option<PathBuf>> {
        let path = self.key_path(id)?;
        Ok(path.is_file().then_some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_resolve_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("keys"));
        assert_eq!(store.resolve_private_key("deploy").unwrap(), None);
        assert!(store.list().unwrap().is_empty());

        let path = store.write("deploy", "  -----BEGIN KEY-----\nabc\n  ").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "-----BEGIN KEY-----\nabc\n");
        assert_eq!(store.resolve_private_key("deploy").unwrap(), Some(path));
        assert_eq!(store.list().unwrap(), vec!["deploy"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.dir().join("deploy.key"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.delete("deploy").unwrap();
        assert!(matches!(store.delete("deploy"), Err(Error::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn overwriting_a_key_tightens_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("keys"));
        std::fs::create_dir_all(store.dir()).unwrap();
        let path = store.dir().join("deploy.key");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.write("deploy", "new").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn ids_cannot_escape_the_key_dir() {
        let store = FileCredentialStore::new("/keys");
        assert!(store.resolve_private_key("../etc/passwd").is_err());
        assert!(store.resolve_private_key("").is_err());
        assert!(store.resolve_private_key(".hidden").is_err());
    }
}
