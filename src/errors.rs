//! Typed error hierarchy for the issue subsystem.
//!
//! Every failure surfaced to a caller collapses into one of three kinds:
//! - `Validation` — caller input is malformed or missing; fix and resend
//! - `NotFound` — the referenced issue or image does not exist
//! - `Storage` — the database or blob layer failed; the whole call may be retried

use serde::Serialize;
use thiserror::Error;

use crate::issues::models::IssueStatus;

/// Coarse classification used by callers and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which halves of the image acceptance policy an upload failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRejection {
    pub filename: String,
    pub media_type: String,
    pub extension: String,
    pub media_type_rejected: bool,
    pub extension_rejected: bool,
    pub allowed_media_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
}

impl std::fmt::Display for ImageRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "File type not allowed.")?;
        if self.media_type_rejected {
            write!(
                f,
                " Mimetype {} is not accepted. Expected one of: {}.",
                self.media_type,
                self.allowed_media_types.join(", ")
            )?;
        }
        if self.extension_rejected {
            let ext = if self.extension.is_empty() {
                "(none)"
            } else {
                self.extension.as_str()
            };
            write!(
                f,
                " Extension {} is not accepted. Expected one of: {}.",
                ext,
                self.allowed_extensions.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Errors from the ingestion, query and status-transition services.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ImageRejected(ImageRejection),

    #[error("Cannot move issue from '{from}' to '{to}'")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    #[error("Issue {id} not found")]
    IssueNotFound { id: String },

    #[error("Image {reference} not found")]
    ImageNotFound { reference: String },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl IssueError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::ImageRejected(_) | Self::InvalidTransition { .. } => {
                ErrorKind::Validation
            }
            Self::IssueNotFound { .. } | Self::ImageNotFound { .. } => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
