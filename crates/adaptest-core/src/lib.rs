//! adaptest-core: computerized adaptive testing engine.
//!
//! This crate holds the item model, the 3PL response model, ability
//! estimation, item selection, stopping rules, and the session state
//! machine that ties them together. [`engine::CatEngine`] exposes the
//! session operations to hosts.

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod irt;
pub mod model;
pub mod scale;
pub mod selector;
pub mod session;
pub mod snapshot;
pub mod statistics;
pub mod stopping;
pub mod traits;

pub use catalog::{load_catalog, validate_catalog, Catalog};
pub use config::{load_config, load_config_from, AdaptestConfig};
pub use engine::CatEngine;
pub use error::EngineError;
