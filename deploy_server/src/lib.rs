//! Site deployment service.
//!
//! Turns a submitted front-end project into a built static site: the
//! sources are written into a per-project workspace, given a bundler
//! configuration, installed and built, published behind nginx under
//! `/creation/<projectId>/`, and screenshotted for a thumbnail. Each job
//! drives one project record through `building` to `ready` or `failed`.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
