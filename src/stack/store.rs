use super::{ContextServices, Initializer, InitializerKind, InitializerRegistry, StacksManager};
use crate::compose::{ComposeCli, ComposeProcessRunner};
use crate::config::{ContextResolver, Settings};
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::docker::EngineClientCache;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A manager shared between callers of one context.
pub type SharedManager = Arc<tokio::sync::Mutex<StacksManager>>;

/// One [`StacksManager`] per context id, created on first use.
pub struct StacksManagerStore {
    settings: Arc<Settings>,
    engines: Arc<EngineClientCache>,
    compose: Arc<dyn ComposeProcessRunner>,
    credentials: Arc<dyn CredentialStore>,
    initializers: Arc<InitializerRegistry>,
    managers: Mutex<HashMap<String, SharedManager>>,
}

impl StacksManagerStore {
    pub fn new(
        settings: Arc<Settings>,
        engines: Arc<EngineClientCache>,
        compose: Arc<dyn ComposeProcessRunner>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        StacksManagerStore {
            settings,
            engines,
            compose,
            credentials,
            initializers: Arc::new(InitializerRegistry::with_builtins()),
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: contexts from the settings, docker CLI engines,
    /// compose CLI and file-backed keys.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let resolver = Arc::new(ContextResolver::load(&settings)?);
        let credentials = Arc::new(FileCredentialStore::new(settings.keys_dir()));
        Ok(Self::new(
            Arc::new(settings),
            Arc::new(EngineClientCache::new(resolver)),
            Arc::new(ComposeCli::new()),
            credentials,
        ))
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn resolver(&self) -> &Arc<ContextResolver> {
        self.engines.resolver()
    }

    pub fn initializers(&self) -> &Arc<InitializerRegistry> {
        &self.initializers
    }

    /// Manager for `context_id`, enumerated on creation.
    pub fn get(&self, context_id: &str) -> Result<SharedManager> {
        if let Some(manager) = self.managers.lock().get(context_id) {
            return Ok(Arc::clone(manager));
        }

        let context = self.resolver().get(context_id)?;
        let endpoint = context.endpoint()?;
        let services = ContextServices {
            settings: Arc::clone(&self.settings),
            engine: self.engines.get_or_create_client(context_id)?,
            compose: Arc::clone(&self.compose),
            credentials: Arc::clone(&self.credentials),
            context,
            endpoint,
        };
        let mut manager = StacksManager::new(services, Arc::clone(&self.initializers));
        manager.enumerate()?;

        let mut managers = self.managers.lock();
        let shared = managers
            .entry(context_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(manager)));
        Ok(Arc::clone(shared))
    }

    /// Forget the manager and engine client of a context.
    pub fn evict(&self, context_id: &str) -> bool {
        self.engines.evict(context_id);
        self.managers.lock().remove(context_id).is_some()
    }

    pub fn register_initializer(&self, kind: InitializerKind, initializer: Arc<dyn Initializer>) {
        tracing::debug!("registering initializer {}", kind);
        self.initializers.register(kind, initializer);
    }

    pub fn deregister_initializer(&self, kind: InitializerKind) -> bool {
        self.initializers.deregister(kind)
    }
}
