//! Docker engine access.
//!
//! [`EngineClient`] is the container-level interface the stack layer talks
//! to; [`DockerClient`] implements it on top of the docker CLI, and
//! [`EngineClientCache`] hands out one client per context.

pub mod cache;
pub mod client;
pub mod engine;
pub mod error;

pub use cache::{EngineClientCache, EngineFactory};
pub use client::DockerClient;
pub use engine::{
    ContainerFilter, ContainerInfo, EngineClient, COMPOSE_PROJECT_LABEL,
    COMPOSE_WORKING_DIR_LABEL,
};
pub use error::DockerError;
