use super::expand_tilde;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_DOCKER_HOME: &str = "/var/lib/docker";
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_COMPOSE_TIMEOUT_SECS: u64 = 60;

/// Process-wide agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Data directory as seen by this process.
    pub data_dir: PathBuf,
    /// The same directory as seen by the docker daemon.
    pub data_home: PathBuf,
    /// Passed to compose as `DOCKER_CONFIG`.
    pub docker_config: Option<PathBuf>,
    pub context_file: PathBuf,
    pub git_timeout: Duration,
    /// Value for compose `--timeout` on stop/down/restart, in seconds.
    pub compose_timeout: u64,
}

impl Settings {
    /// Settings for a data directory with every other value at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = absolutize(&expand_tilde(&data_dir.into()));
        Settings {
            data_home: data_dir.clone(),
            context_file: data_dir.join("contexts.json"),
            data_dir,
            docker_config: None,
            git_timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
            compose_timeout: DEFAULT_COMPOSE_TIMEOUT_SECS,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("STACK_AGENT_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let mut settings = Self::with_data_dir(data_dir);

        let docker_home = lookup("DOCKER_HOME").unwrap_or_else(|| DEFAULT_DOCKER_HOME.into());
        settings.data_home = derive_data_home(
            lookup("STACK_AGENT_DATA_HOME").as_deref(),
            lookup("STACK_AGENT_DATA_VOLUME").as_deref(),
            Path::new(&docker_home),
            &settings.data_dir,
        );

        settings.docker_config = lookup("DOCKER_CONFIG").map(|p| expand_tilde(Path::new(&p)));
        if let Some(file) = lookup("STACK_AGENT_CONTEXT_FILE") {
            settings.context_file = expand_tilde(Path::new(&file));
        }
        if let Some(secs) = lookup("STACK_AGENT_GIT_TIMEOUT") {
            settings.git_timeout = Duration::from_secs(parse_secs("STACK_AGENT_GIT_TIMEOUT", &secs)?);
        }
        if let Some(secs) = lookup("STACK_AGENT_COMPOSE_TIMEOUT") {
            settings.compose_timeout = parse_secs("STACK_AGENT_COMPOSE_TIMEOUT", &secs)?;
        }

        Ok(settings)
    }

    /// `<data_dir>/stacks/<ctx>`
    pub fn stacks_dir(&self, context_id: &str) -> PathBuf {
        self.data_dir.join("stacks").join(context_id)
    }

    /// `<data_dir>/stacks/<ctx>/<name>.stack.json`
    pub fn stack_config_file(&self, context_id: &str, name: &str) -> PathBuf {
        self.stacks_dir(context_id)
            .join(format!("{}{}", name, super::STACK_CONFIG_SUFFIX))
    }

    /// `<data_dir>/stacks/<ctx>/<name>`
    pub fn stack_project_dir(&self, context_id: &str, name: &str) -> PathBuf {
        self.stacks_dir(context_id).join(name)
    }

    /// Directory holding stored private keys.
    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("config").join("keys")
    }
}

/// Explicit value wins, then the named volume under the docker root, then the
/// agent's own data dir.
pub fn derive_data_home(
    explicit: Option<&str>,
    volume: Option<&str>,
    docker_home: &Path,
    data_dir: &Path,
) -> PathBuf {
    if let Some(home) = explicit {
        return PathBuf::from(home);
    }
    if let Some(volume) = volume {
        return docker_home.join("volumes").join(volume).join("_data");
    }
    data_dir.to_path_buf()
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        Error::Configuration(format!(
            "{} must be a whole number of seconds, got '{}'",
            key, value
        ))
    })
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path.strip_prefix(".").unwrap_or(path)),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_follow_data_dir() {
        let settings = Settings::from_lookup(lookup_from(&[("STACK_AGENT_DATA_DIR", "/srv/agent")]))
            .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/srv/agent"));
        assert_eq!(settings.data_home, PathBuf::from("/srv/agent"));
        assert_eq!(settings.context_file, PathBuf::from("/srv/agent/contexts.json"));
        assert_eq!(settings.git_timeout, Duration::from_secs(120));
        assert_eq!(settings.compose_timeout, 60);
        assert_eq!(settings.docker_config, None);
    }

    #[test]
    fn relative_data_dir_is_made_absolute() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert!(settings.data_dir.is_absolute());
        assert!(settings.data_dir.ends_with("data"));
    }

    #[test]
    fn data_home_from_volume() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("STACK_AGENT_DATA_DIR", "/app/data"),
            ("STACK_AGENT_DATA_VOLUME", "agent_data"),
            ("DOCKER_HOME", "/mnt/docker"),
        ]))
        .unwrap();
        assert_eq!(
            settings.data_home,
            PathBuf::from("/mnt/docker/volumes/agent_data/_data")
        );
    }

    #[test]
    fn explicit_data_home_wins_over_volume() {
        let home = derive_data_home(
            Some("/host/data"),
            Some("vol"),
            Path::new("/var/lib/docker"),
            Path::new("/app/data"),
        );
        assert_eq!(home, PathBuf::from("/host/data"));
    }

    #[test]
    fn invalid_timeout_is_configuration_error() {
        let err = Settings::from_lookup(lookup_from(&[("STACK_AGENT_GIT_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("STACK_AGENT_GIT_TIMEOUT"));
    }

    #[test]
    fn stack_paths() {
        let settings = Settings::with_data_dir("/d");
        assert_eq!(
            settings.stack_config_file("prod", "web"),
            PathBuf::from("/d/stacks/prod/web.stack.json")
        );
        assert_eq!(
            settings.stack_project_dir("prod", "web"),
            PathBuf::from("/d/stacks/prod/web")
        );
        assert_eq!(settings.keys_dir(), PathBuf::from("/d/config/keys"));
    }
}
