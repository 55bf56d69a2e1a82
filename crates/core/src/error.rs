use thiserror::Error;

use crate::operation::{Operation, ResourceKind};

/// Submission engine error types
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid {kind} operation: '{value}'")]
    InvalidOperation { kind: ResourceKind, value: String },

    #[error("Missing {kind} identifier for {operation} operation")]
    MissingIdentifier {
        kind: ResourceKind,
        operation: Operation,
    },

    #[error("Nothing to submit: record produced no bundle entries")]
    EmptyBundle,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("XML parse error: {0}")]
    XmlRead(#[from] roxmltree::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl SubmitError {
    /// Validation failures are fatal for the current record only.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SubmitError::InvalidOperation { .. }
                | SubmitError::MissingIdentifier { .. }
                | SubmitError::EmptyBundle
        )
    }
}

pub type SubmitResult<T> = std::result::Result<T, SubmitError>;
