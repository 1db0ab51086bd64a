//! Task configuration
//!
//! `TaskConfig` carries everything a deploy task needs to know that is not a
//! manifest, and the validator runs the pre-flight checks before the cluster
//! is touched.

pub mod task_config;
pub mod validator;

pub use task_config::{
    DEFAULT_MAX_WATCH_SECONDS, DEFAULT_PRUNE_WHITELIST, TaskConfig, validate_selector,
};
pub use validator::ConfigValidator;
