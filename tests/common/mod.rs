//! In-memory engine and compose fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use stack_agent::compose::{ComposeInvocation, ComposeProcessRunner, ProcessOutput};
use stack_agent::config::{Context, ContextResolver, EndpointDescriptor};
use stack_agent::credentials::FileCredentialStore;
use stack_agent::docker::{
    ContainerFilter, ContainerInfo, DockerError, EngineClient, EngineClientCache,
    COMPOSE_PROJECT_LABEL, COMPOSE_WORKING_DIR_LABEL,
};
use stack_agent::{Settings, StacksManagerStore};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub fn container(id: &str, project: &str, working_dir: &str, state: &str) -> ContainerInfo {
    let mut labels = HashMap::new();
    labels.insert(COMPOSE_PROJECT_LABEL.to_string(), project.to_string());
    labels.insert(COMPOSE_WORKING_DIR_LABEL.to_string(), working_dir.to_string());
    ContainerInfo {
        id: id.to_string(),
        name: format!("{}-{}-1", project, id),
        image: "nginx:alpine".to_string(),
        state: state.to_string(),
        status: String::new(),
        labels,
    }
}

/// Engine holding containers in memory.
#[derive(Default)]
pub struct FakeEngine {
    containers: Mutex<Vec<ContainerInfo>>,
    failing: Mutex<HashSet<String>>,
    list_fails: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, container: ContainerInfo) {
        self.containers.lock().push(container);
    }

    /// Make every operation on `id` fail.
    pub fn fail_container(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.list_fails.lock() = fail;
    }

    pub fn containers(&self) -> Vec<ContainerInfo> {
        self.containers.lock().clone()
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        self.containers
            .lock()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.state.clone())
    }

    pub fn remove_project(&self, project: &str) {
        self.containers
            .lock()
            .retain(|c| c.compose_project() != Some(project));
    }

    pub fn set_project_state(&self, project: &str, state: &str) {
        for c in self.containers.lock().iter_mut() {
            if c.compose_project() == Some(project) {
                c.state = state.to_string();
            }
        }
    }

    fn operate(&self, verb: &str, id: &str, state: Option<&str>) -> Result<(), DockerError> {
        self.calls.lock().push(format!("{} {}", verb, id));
        if self.failing.lock().contains(id) {
            return Err(DockerError::CommandFailed {
                command: format!("docker {} {}", verb, id),
                stderr: "simulated failure".to_string(),
                exit_code: Some(1),
            });
        }
        let mut containers = self.containers.lock();
        let Some(pos) = containers.iter().position(|c| c.id == id) else {
            return Err(DockerError::ContainerNotFound {
                container: id.to_string(),
            });
        };
        match state {
            Some(state) => containers[pos].state = state.to_string(),
            None => {
                containers.remove(pos);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerInfo>, DockerError> {
        if *self.list_fails.lock() {
            return Err(DockerError::CommandFailed {
                command: "docker ps".to_string(),
                stderr: "Cannot connect to the Docker daemon".to_string(),
                exit_code: Some(1),
            });
        }
        Ok(self
            .containers
            .lock()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.operate("start", id, Some("running"))
    }

    async fn stop_container(&self, id: &str) -> Result<(), DockerError> {
        self.operate("stop", id, Some("exited"))
    }

    async fn restart_container(&self, id: &str) -> Result<(), DockerError> {
        self.operate("restart", id, Some("running"))
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        self.operate("rm", id, None)
    }
}

/// Compose runner that records invocations and mirrors their effect on a
/// [`FakeEngine`].
pub struct RecordingCompose {
    engine: Arc<FakeEngine>,
    pub invocations: Mutex<Vec<ComposeInvocation>>,
    failure: Mutex<Option<(i32, String)>>,
}

impl RecordingCompose {
    pub fn new(engine: Arc<FakeEngine>) -> Arc<Self> {
        Arc::new(RecordingCompose {
            engine,
            invocations: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        })
    }

    /// Make every following call exit with `code` and `stderr`.
    pub fn fail_with(&self, code: i32, stderr: &str) {
        *self.failure.lock() = Some((code, stderr.to_string()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|i| i.command.clone())
            .collect()
    }

    pub fn last(&self) -> Option<ComposeInvocation> {
        self.invocations.lock().last().cloned()
    }
}

#[async_trait]
impl ComposeProcessRunner for RecordingCompose {
    async fn run(&self, invocation: &ComposeInvocation) -> stack_agent::Result<ProcessOutput> {
        self.invocations.lock().push(invocation.clone());
        if let Some((code, stderr)) = self.failure.lock().clone() {
            return Ok(ProcessOutput {
                stdout: String::new(),
                stderr,
                exit_code: Some(code),
            });
        }

        let project = invocation.project_name.as_str();
        match invocation.command.as_str() {
            "up" => {
                self.engine.remove_project(project);
                self.engine.add(container(
                    &format!("{}-web", project),
                    project,
                    &invocation.working_dir.display().to_string(),
                    "running",
                ));
            }
            "down" => self.engine.remove_project(project),
            "stop" => self.engine.set_project_state(project, "exited"),
            "restart" => self.engine.set_project_state(project, "running"),
            _ => {}
        }
        Ok(ProcessOutput {
            stdout: format!("{} ok\n", invocation.command),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }
}

/// A store over a temporary data dir wired to the fakes.
pub struct TestEnv {
    pub dir: TempDir,
    pub engine: Arc<FakeEngine>,
    pub compose: Arc<RecordingCompose>,
    pub store: StacksManagerStore,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_contexts(Vec::new())
    }

    /// Like [`TestEnv::new`], with extra contexts next to the builtin `local`.
    pub fn with_contexts(contexts: Vec<Context>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let settings = Settings::with_data_dir(dir.path().join("data"));
        let engine = FakeEngine::new();
        let compose = RecordingCompose::new(Arc::clone(&engine));

        let resolver = Arc::new(ContextResolver::new(contexts));
        let factory_engine = Arc::clone(&engine);
        let engines = EngineClientCache::with_factory(
            resolver,
            Arc::new(move |_: &Context, _: &EndpointDescriptor| {
                Arc::clone(&factory_engine) as Arc<dyn EngineClient>
            }),
        );
        let credentials = Arc::new(FileCredentialStore::new(settings.keys_dir()));
        let store = StacksManagerStore::new(
            Arc::new(settings),
            Arc::new(engines),
            Arc::clone(&compose) as Arc<dyn ComposeProcessRunner>,
            credentials,
        );

        TestEnv {
            dir,
            engine,
            compose,
            store,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.store.settings().data_dir
    }

    pub fn stacks_dir(&self) -> std::path::PathBuf {
        self.store.settings().stacks_dir("local")
    }
}
