//! Error types for the forcing pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::product::ProductKind;

/// Errors raised while deriving identities or running a pipeline stage.
///
/// Every variant describes a failure of a single file or unit of work.
/// Whether one failure aborts a whole batch is left to the caller.
#[derive(Error, Debug)]
pub enum ForcingError {
    #[error("{product} filename does not match the expected grammar: {filename}")]
    MalformedFilename {
        product: ProductKind,
        filename: String,
    },

    #[error("Output path does not have the canonical shape: {}", path.display())]
    MalformedOutputPath { path: PathBuf },

    #[error(
        "No substitute for {} ({product}): earlier run file {} does not exist",
        target.display(),
        candidate.display()
    )]
    SubstituteNotFound {
        product: ProductKind,
        candidate: PathBuf,
        target: PathBuf,
    },

    #[error(
        "External tool {tool} failed in the {stage} stage for {} (exit code {code:?})",
        target.display()
    )]
    ExternalToolFailure {
        stage: &'static str,
        tool: String,
        target: PathBuf,
        code: Option<i32>,
    },

    #[error("{product} is not supported by the {stage} stage")]
    UnsupportedProduct {
        product: ProductKind,
        stage: &'static str,
    },

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Missing configuration value [{section}] {key}")]
    MissingConfig { section: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ForcingError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForcingError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ForcingError::MalformedFilename { .. } => "malformed_filename",
            ForcingError::MalformedOutputPath { .. } => "malformed_output_path",
            ForcingError::SubstituteNotFound { .. } => "substitute_not_found",
            ForcingError::ExternalToolFailure { .. } => "external_tool_failure",
            ForcingError::UnsupportedProduct { .. } => "unsupported_product",
            ForcingError::UnknownProduct(_) => "unknown_product",
            ForcingError::MissingConfig { .. } => "missing_config",
            ForcingError::InvalidConfig(_) => "invalid_config",
            ForcingError::Io { .. } => "io",
        }
    }
}

/// Result type for forcing operations.
pub type Result<T> = std::result::Result<T, ForcingError>;
