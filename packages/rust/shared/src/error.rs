//! Error types for plone-mcp.
//!
//! Library crates use [`PloneMcpError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all plone-mcp operations.
#[derive(Debug, thiserror::Error)]
pub enum PloneMcpError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the Plone REST API.
    #[error("network error: {0}")]
    Network(String),

    /// The Plone REST API answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Markdown input could not be tokenized.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Block data failed its type-specific normalization rule.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced block id or block type does not exist.
    #[error("{}{what} '{name}' not found; valid values: {}", format_context(.context), format_valid(.valid))]
    NotFound {
        what: &'static str,
        name: String,
        valid: Vec<String>,
        /// Where in a batch the lookup failed, e.g. `block 2`.
        context: Option<String>,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PloneMcpError>;

impl PloneMcpError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error listing the values the caller could have used.
    pub fn not_found<I, S>(what: &'static str, name: impl Into<String>, valid: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NotFound {
            what,
            name: name.into(),
            valid: valid.into_iter().map(Into::into).collect(),
            context: None,
        }
    }

    /// Prefix a validation or not-found error with its position in a batch.
    /// Other variants pass through unchanged.
    pub fn within(self, context: impl Into<String>) -> Self {
        match self {
            Self::Validation { message } => Self::Validation {
                message: format!("{}: {message}", context.into()),
            },
            Self::NotFound {
                what, name, valid, ..
            } => Self::NotFound {
                what,
                name,
                valid,
                context: Some(context.into()),
            },
            other => other,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_context(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!("{c}: "))
        .unwrap_or_default()
}

fn format_valid(valid: &[String]) -> String {
    if valid.is_empty() {
        "(none)".to_string()
    } else {
        valid.join(", ")
    }
}
