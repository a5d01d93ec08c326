use super::DockerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Label docker compose puts on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Label holding the directory compose was run from.
pub const COMPOSE_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// A container as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Engine state: `created`, `running`, `paused`, `exited`, ...
    pub state: String,
    /// Human readable status, e.g. "Up 3 minutes".
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(COMPOSE_PROJECT_LABEL).map(String::as_str)
    }

    pub fn compose_working_dir(&self) -> Option<&str> {
        self.labels
            .get(COMPOSE_WORKING_DIR_LABEL)
            .map(String::as_str)
            .filter(|dir| !dir.is_empty())
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Container listing filter. Always includes stopped containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub labels: Vec<(String, String)>,
}

impl ContainerFilter {
    /// Every container on the engine.
    pub fn all() -> Self {
        Self::default()
    }

    /// Containers belonging to the given compose project.
    pub fn compose_project(name: &str) -> Self {
        Self {
            labels: vec![(COMPOSE_PROJECT_LABEL.to_string(), name.to_string())],
        }
    }

    pub fn matches(&self, container: &ContainerInfo) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| container.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Container-level access to one Docker engine.
///
/// The production implementation is [`DockerClient`](super::DockerClient);
/// tests substitute in-memory fakes.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerInfo>, DockerError>;

    /// Start a container; unpauses paused containers and leaves running ones alone.
    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    async fn stop_container(&self, id: &str) -> Result<(), DockerError>;

    async fn restart_container(&self, id: &str) -> Result<(), DockerError>;

    /// Stop and remove a container.
    async fn remove_container(&self, id: &str) -> Result<(), DockerError>;

    /// Working directory compose used for the project, taken from any of its containers.
    async fn get_stack_project_dir(&self, name: &str) -> Result<Option<PathBuf>, DockerError> {
        let containers = self.list_stack_containers(name).await?;
        Ok(containers
            .iter()
            .find_map(|c| c.compose_working_dir())
            .map(PathBuf::from))
    }

    async fn list_stack_containers(&self, name: &str) -> Result<Vec<ContainerInfo>, DockerError> {
        self.list_containers(&ContainerFilter::compose_project(name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, project: Option<&str>, state: &str) -> ContainerInfo {
        let mut labels = HashMap::new();
        if let Some(p) = project {
            labels.insert(COMPOSE_PROJECT_LABEL.to_string(), p.to_string());
        }
        ContainerInfo {
            id: id.to_string(),
            name: format!("{}-1", id),
            image: "nginx".to_string(),
            state: state.to_string(),
            status: String::new(),
            labels,
        }
    }

    #[test]
    fn filter_matches_project_label() {
        let filter = ContainerFilter::compose_project("web");
        assert!(filter.matches(&container("a", Some("web"), "running")));
        assert!(!filter.matches(&container("b", Some("db"), "running")));
        assert!(!filter.matches(&container("c", None, "running")));
        assert!(ContainerFilter::all().matches(&container("c", None, "exited")));
    }

    #[test]
    fn empty_working_dir_label_is_ignored() {
        let mut c = container("a", Some("web"), "running");
        c.labels
            .insert(COMPOSE_WORKING_DIR_LABEL.to_string(), String::new());
        assert_eq!(c.compose_working_dir(), None);
        assert!(c.is_running());
    }
}
