//! Deploy dispatch
//!
//! The apply/replace/create/prune engine and the classifier that turns
//! kubectl failure output into actionable summary paragraphs.

pub mod deployer;
pub mod error_report;

pub use deployer::{DeployOptions, ResourceDeployer};
pub use error_report::{
    ROLLBACK_WARNING, SUPPRESSED_FOR_SECURITY, parse_pruned, record_apply_failure,
    record_invalid_template,
};
