//! Error kinds surfaced by the analysis core
//!
//! Rule execution failures are not errors at this level; they are recorded
//! as [`RuleErrorInfo`](crate::models::RuleErrorInfo) and the scan continues.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a scan before or while it runs
#[derive(Error, Debug)]
pub enum NestlintError {
    /// Malformed config, glob or threshold value
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The target source could not be ingested
    #[error("Failed to scan {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },

    /// Malformed caller-supplied parameter
    #[error("Invalid parameter: {0}")]
    Validation(String),
}

impl NestlintError {
    pub fn scan(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        NestlintError::Scan {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type NestlintResult<T> = Result<T, NestlintError>;
