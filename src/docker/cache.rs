use super::{DockerClient, EngineClient};
use crate::config::{Context, ContextResolver, EndpointDescriptor};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an engine client for a resolved context.
pub type EngineFactory =
    Arc<dyn Fn(&Context, &EndpointDescriptor) -> Arc<dyn EngineClient> + Send + Sync>;

/// Per-context cache of engine clients, built lazily through the resolver.
///
/// Construction happens outside the lock. Two callers racing on the same
/// uncached id may both build a client; the later insert wins and both
/// handles stay usable.
pub struct EngineClientCache {
    resolver: Arc<ContextResolver>,
    factory: EngineFactory,
    clients: RwLock<HashMap<String, Arc<dyn EngineClient>>>,
}

impl EngineClientCache {
    /// Cache producing docker CLI clients pointed at each context's endpoint.
    pub fn new(resolver: Arc<ContextResolver>) -> Self {
        Self::with_factory(
            resolver,
            Arc::new(|_ctx: &Context, endpoint: &EndpointDescriptor| {
                Arc::new(DockerClient::with_host(endpoint.docker_host())) as Arc<dyn EngineClient>
            }),
        )
    }

    pub fn with_factory(resolver: Arc<ContextResolver>, factory: EngineFactory) -> Self {
        Self {
            resolver,
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &Arc<ContextResolver> {
        &self.resolver
    }

    pub fn get_or_create_client(&self, context_id: &str) -> Result<Arc<dyn EngineClient>> {
        if let Some(client) = self.clients.read().get(context_id) {
            return Ok(Arc::clone(client));
        }

        let context = self.resolver.get(context_id)?;
        let endpoint = self.resolver.resolve(context_id)?;
        let client = (self.factory)(&context, &endpoint);
        tracing::debug!(
            "created engine client for context '{}' ({})",
            context_id,
            endpoint.docker_host()
        );

        self.clients
            .write()
            .insert(context_id.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Drop a cached client so the next lookup rebuilds it.
    pub fn evict(&self, context_id: &str) -> bool {
        self.clients.write().remove(context_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
