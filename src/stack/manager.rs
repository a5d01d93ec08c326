use super::{
    ContainerStack, ContextServices, InitParams, InitTarget, InitializerKind,
    InitializerRegistry, ManagedComposeStack, StackOutput, StackStatus, StackSummary, SyncEngine,
    SyncReport, UnmanagedComposeStack,
};
use crate::compose::ComposeArgs;
use crate::config::{validate_stack_name, STACK_CONFIG_SUFFIX};
use crate::docker::{ContainerFilter, ContainerInfo};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of [`StacksManager::destroy`]. Every step runs; failures are
/// collected instead of aborting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub log: Vec<String>,
    pub errors: Vec<String>,
}

impl DestroyReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn step(&mut self, label: &str, result: Result<String>) {
        match result {
            Ok(out) if out.is_empty() => self.log.push(format!("{}: ok", label)),
            Ok(out) => self.log.push(format!("{}: {}", label, out)),
            Err(e) => {
                tracing::warn!("{} failed: {}", label, e);
                let line = format!("{} failed: {}", label, e);
                self.log.push(line.clone());
                self.errors.push(line);
            }
        }
    }
}

/// Stacks of one context.
///
/// Holds the in-memory registry of managed stacks (rebuilt from disk by
/// [`enumerate`](Self::enumerate)) plus any unmanaged stacks adopted since.
pub struct StacksManager {
    context_id: String,
    services: ContextServices,
    initializers: Arc<InitializerRegistry>,
    sync: SyncEngine,
    stacks: BTreeMap<String, Arc<dyn ContainerStack>>,
}

impl StacksManager {
    pub fn new(services: ContextServices, initializers: Arc<InitializerRegistry>) -> Self {
        let sync = SyncEngine::new(
            Arc::clone(&services.credentials),
            services.settings.git_timeout,
        );
        StacksManager {
            context_id: services.context_id().to_string(),
            services,
            initializers,
            sync,
            stacks: BTreeMap::new(),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn services(&self) -> &ContextServices {
        &self.services
    }

    fn stacks_dir(&self) -> PathBuf {
        self.services.settings.stacks_dir(&self.context_id)
    }

    /// Rebuild the registry from `<data_dir>/stacks/<ctx>/*.stack.json`.
    ///
    /// Adopted unmanaged stacks are dropped. Unreadable configs are skipped.
    pub fn enumerate(&mut self) -> Result<usize> {
        let dir = self.stacks_dir();
        std::fs::create_dir_all(&dir)?;

        let mut stacks: BTreeMap<String, Arc<dyn ContainerStack>> = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.strip_suffix(STACK_CONFIG_SUFFIX))
            else {
                continue;
            };
            if !path.is_file() {
                continue;
            }
            if let Err(e) = validate_stack_name(name) {
                tracing::warn!("skipping stack config {}: {}", path.display(), e);
                continue;
            }
            match ManagedComposeStack::load(name, self.services.clone()) {
                Ok(stack) => {
                    stacks.insert(name.to_string(), Arc::new(stack));
                }
                Err(e) => {
                    tracing::warn!("skipping stack config {}: {}", path.display(), e);
                }
            }
        }

        tracing::debug!(
            "context '{}': {} managed stack(s) in {}",
            self.context_id,
            stacks.len(),
            dir.display()
        );
        self.stacks = stacks;
        Ok(self.stacks.len())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContainerStack>> {
        self.stacks.get(name).cloned()
    }

    /// Registered names, managed and adopted.
    pub fn names(&self) -> Vec<String> {
        self.stacks.keys().cloned().collect()
    }

    /// The registered stack, or an unmanaged stack adopted from the engine.
    ///
    /// Never fails: an unknown name yields an unmanaged stack with no
    /// containers, for which `exists()` is false.
    pub async fn get_or_unmanaged(&mut self, name: &str) -> Arc<dyn ContainerStack> {
        if let Some(stack) = self.get(name) {
            return stack;
        }
        let stack: Arc<dyn ContainerStack> = Arc::new(
            UnmanagedComposeStack::adopt(
                name,
                &self.context_id,
                Arc::clone(&self.services.engine),
            )
            .await,
        );
        self.stacks.insert(name.to_string(), Arc::clone(&stack));
        stack
    }

    /// Create a managed stack with the initializer named `kind`.
    pub async fn init_stack(
        &mut self,
        name: &str,
        kind: &str,
        params: &InitParams,
    ) -> Result<Arc<dyn ContainerStack>> {
        validate_stack_name(name)?;
        let config_file = self.services.config_file(name);
        if self.get(name).is_some() || config_file.exists() {
            return Err(Error::stack_exists(name));
        }
        let kind: InitializerKind = kind.parse()?;

        let target = InitTarget {
            context_id: self.context_id.clone(),
            stack_name: name.to_string(),
            project_dir: self.services.project_dir(name),
            config_file,
            git_timeout: self.services.settings.git_timeout,
            credentials: Arc::clone(&self.services.credentials),
        };
        self.initializers.run(kind, &target, params).await?;

        let stack: Arc<dyn ContainerStack> =
            Arc::new(ManagedComposeStack::load(name, self.services.clone())?);
        self.stacks.insert(name.to_string(), Arc::clone(&stack));
        tracing::info!("created {} stack '{}' on context '{}'", kind, name, self.context_id);
        Ok(stack)
    }

    pub async fn start(&mut self, name: &str) -> Result<StackOutput> {
        self.get_or_unmanaged(name).await.up().await
    }

    /// `up` with extra compose arguments. Unmanaged stacks ignore them.
    pub async fn start_with(&mut self, name: &str, args: ComposeArgs) -> Result<StackOutput> {
        let stack = self.get_or_unmanaged(name).await;
        match stack.as_managed() {
            Some(managed) => managed.up_with(args).await,
            None => stack.up().await,
        }
    }

    pub async fn stop(&mut self, name: &str) -> Result<StackOutput> {
        self.get_or_unmanaged(name).await.stop().await
    }

    pub async fn restart(&mut self, name: &str) -> Result<StackOutput> {
        self.get_or_unmanaged(name).await.restart().await
    }

    /// Bring the stack down (`compose down` or stop for unmanaged stacks).
    pub async fn delete(&mut self, name: &str) -> Result<StackOutput> {
        self.get_or_unmanaged(name).await.down().await
    }

    pub async fn ps(&mut self, name: &str) -> Result<StackOutput> {
        let stack = self.get_or_unmanaged(name).await;
        match stack.as_managed() {
            Some(managed) => managed.ps().await,
            None => Err(Error::Configuration(format!(
                "Cannot run compose ps for unmanaged stack '{}'",
                name
            ))),
        }
    }

    /// Down, destroy, then remove the managed files. Never fails.
    pub async fn destroy(&mut self, name: &str) -> DestroyReport {
        let stack = self.get_or_unmanaged(name).await;
        let mut report = DestroyReport::default();

        report.step("down", stack.down().await.map(|o| o.to_string()));
        report.step("destroy", stack.destroy().await.map(|o| o.to_string()));

        if stack.is_managed() {
            let stacks_dir = self.stacks_dir();
            let project_dir = self.services.project_dir(name);
            report.step(
                "remove project dir",
                remove_stack_path(&stacks_dir, name, &project_dir, true),
            );
            let config_file = self.services.config_file(name);
            report.step(
                "remove stack config",
                remove_stack_path(&stacks_dir, name, &config_file, false),
            );
        }

        self.stacks.remove(name);
        tracing::info!(
            "destroyed stack '{}' on context '{}' ({} error(s))",
            name,
            self.context_id,
            report.errors.len()
        );
        report
    }

    /// Re-materialize a managed stack from its declared source.
    pub async fn sync(&mut self, name: &str) -> Result<SyncReport> {
        self.enumerate()?;
        let stack = self.get(name);
        let managed = stack.as_deref().and_then(|s| s.as_managed()).ok_or_else(|| {
            Error::Configuration(format!("Cannot sync unmanaged stack '{}'", name))
        })?;
        self.sync.sync_stack(managed).await
    }

    /// Managed stacks plus every compose project running on the engine.
    ///
    /// An unreachable engine still lists the managed stacks, without containers.
    pub async fn list(&mut self) -> Result<Vec<StackSummary>> {
        self.enumerate()?;
        let containers = match self
            .services
            .engine
            .list_containers(&ContainerFilter::all())
            .await
        {
            Ok(containers) => containers,
            Err(e) => {
                tracing::warn!("listing containers on '{}' failed: {}", self.context_id, e);
                Vec::new()
            }
        };

        let mut by_project: BTreeMap<String, Vec<ContainerInfo>> = BTreeMap::new();
        for container in containers {
            if let Some(project) = container.compose_project().map(str::to_string) {
                by_project.entry(project).or_default().push(container);
            }
        }

        let mut summaries = Vec::new();
        for (name, stack) in &self.stacks {
            let containers = by_project.remove(name).unwrap_or_default();
            summaries.push(StackSummary::new(stack.as_ref(), containers));
        }
        for (name, containers) in by_project {
            let project_dir = containers
                .iter()
                .find_map(ContainerInfo::compose_working_dir)
                .map(PathBuf::from);
            summaries.push(StackSummary {
                name,
                context_id: self.context_id.clone(),
                managed: false,
                project_dir,
                status: StackStatus::from_containers(&containers),
                containers,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Summary of one stack. Unknown names with no containers are `NotFound`.
    pub async fn describe(&mut self, name: &str) -> Result<StackSummary> {
        let stack = self.get_or_unmanaged(name).await;
        let containers = self.services.engine.list_stack_containers(name).await?;
        if !stack.is_managed() && containers.is_empty() {
            self.stacks.remove(name);
            return Err(Error::stack_not_found(name));
        }
        Ok(StackSummary::new(stack.as_ref(), containers))
    }
}

/// Remove a stack's file or directory. Only direct children of `stacks_dir`
/// belonging to a valid stack name are ever touched.
fn remove_stack_path(stacks_dir: &Path, name: &str, path: &Path, dir: bool) -> Result<String> {
    validate_stack_name(name)?;
    if path.parent() != Some(stacks_dir) {
        return Err(Error::Configuration(format!(
            "Refusing to remove {}: not inside {}",
            path.display(),
            stacks_dir.display()
        )));
    }
    remove_path(path, dir)
}

fn remove_path(path: &Path, dir: bool) -> Result<String> {
    if !path.exists() {
        return Ok(format!("{} already absent", path.display()));
    }
    if dir {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(format!("removed {}", path.display()))
}
