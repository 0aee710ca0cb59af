//! CLI error types with exit code handling
//!
//! Every failure of a command becomes a [`CliError`], which knows the exit
//! code the process ends with.

use keel_kube::ReleaseError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Request rejected before anything touched the cluster
    #[error("Validation failed: {message}")]
    #[diagnostic(code(keel::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Template error: {message}")]
    #[diagnostic(code(keel::cli::template))]
    Template { message: String },

    /// Chart structure or loading error
    #[error("Chart error: {message}")]
    #[diagnostic(code(keel::cli::chart))]
    Chart { message: String },

    #[error("{message}")]
    #[diagnostic(code(keel::cli::release))]
    Release {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Cluster error: {message}")]
    #[diagnostic(code(keel::cli::cluster))]
    Cluster { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(keel::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(keel::cli::error))]
    Other { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Release { .. } => exit_codes::RELEASE_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }
}

impl From<ReleaseError> for CliError {
    fn from(err: ReleaseError) -> Self {
        let message = err.to_string();
        match err {
            ReleaseError::Render(_) => CliError::Template { message },
            ReleaseError::Io(_) => CliError::Io { message },
            ReleaseError::ReleaseNotFound(ref name) => CliError::Release {
                help: Some(format!("Run `keel list --all` to see every release, including {name}")),
                message,
            },
            ReleaseError::AlreadyDeleted(ref name) => CliError::Release {
                help: Some(format!("Run `keel uninstall --purge {name}` to remove its history")),
                message,
            },
            ReleaseError::OperationInProgress { .. } | ReleaseError::OutOfDate { .. } => {
                CliError::Release {
                    message,
                    help: None,
                }
            }
            ReleaseError::HookFailed { .. }
            | ReleaseError::Cluster(_)
            | ReleaseError::Timeout(_)
            | ReleaseError::Discovery(_)
            | ReleaseError::Kube(_)
            | ReleaseError::Remote(_) => CliError::Cluster { message },
            ref e if e.is_validation() => CliError::Validation {
                message,
                help: None,
            },
            _ => CliError::Other { message },
        }
    }
}

impl From<keel_core::CoreError> for CliError {
    fn from(err: keel_core::CoreError) -> Self {
        match err {
            keel_core::CoreError::Io(e) => CliError::from(e),
            other => CliError::Chart {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
