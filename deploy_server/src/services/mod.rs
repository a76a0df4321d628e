//! Deployment services, one per pipeline stage plus the state machine
//! tying them together.

pub mod build_config;
pub mod build_executor;
pub mod deployer;
pub mod materializer;
pub mod pg_store;
pub mod process;
pub mod project_store;
pub mod publisher;
pub mod screenshot;
pub mod thumbnails;
pub mod workspace;
