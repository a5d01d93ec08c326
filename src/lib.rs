#![allow(unused_assignments)]

//! # stack-agent
//!
//! Lifecycle and synchronization of docker compose stacks across Docker
//! contexts.
//!
//! ## Features
//!
//! - **Contexts**: local socket, TCP and SSH engines resolved by id, from a
//!   contexts file or the environment
//! - **Managed stacks**: created by an initializer (scratch, inline template,
//!   template repository, URL, git) and persisted as `<name>.stack.json`
//! - **Unmanaged stacks**: compose projects found on the engine by label and
//!   driven container by container
//! - **Sync**: re-fetch a stack's repository (locally or on the engine host
//!   over SSH) and render `docker-compose.stack.yml` with bind mounts rooted
//!   where the daemon can see them
//!
//! ## Quick Start
//!
//! ```no_run
//! use stack_agent::{InitParams, Settings, StacksManagerStore};
//!
//! # async fn example() -> Result<(), stack_agent::Error> {
//! let store = StacksManagerStore::from_settings(Settings::from_env()?)?;
//! let manager = store.get("local")?;
//! let mut manager = manager.lock().await;
//!
//! let params = InitParams::new()
//!     .with("compose_content", "services:\n  web:\n    image: nginx\n");
//! manager.init_stack("web", "scratch", &params).await?;
//! manager.start("web").await?;
//!
//! for stack in manager.list().await? {
//!     println!("{} {}", stack.name, stack.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! [`StacksManagerStore`] hands out one `tokio::sync::Mutex`-guarded
//! [`StacksManager`] per context. Calls on one context are serialized through
//! it; different contexts proceed independently.

pub mod compose;
pub mod config;
pub mod credentials;
pub mod docker;
pub mod error;
pub mod git;
pub mod stack;

pub use config::{Context, ContextResolver, EndpointDescriptor, Settings, StackConfig};
pub use error::{Error, Result};
pub use stack::{
    BatchResult, ContainerStack, DestroyReport, InitParams, InitializerKind, StackOutput,
    StackStatus, StackSummary, StacksManager, StacksManagerStore, SyncReport,
};
