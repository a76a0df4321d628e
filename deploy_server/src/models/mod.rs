//! Deployment data models.

pub mod job;
pub mod project;
