//! Error types for mapping resolution, editing, and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the external collaborator (load/save transport).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    // Payload errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("{message}")]
    Rejected { message: String },
}

impl CollaboratorError {
    /// Shorthand for a collaborator-side rejection with a plain message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. }
            | Self::ReadError { .. }
            | Self::WriteError { .. }
            | Self::Status { .. } => 3,
            #[cfg(feature = "remote")]
            Self::Network { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors raised by the editing session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load mapping: {message}")]
    LoadFailure { message: String },

    #[error("failed to save mapping: {message}")]
    SaveFailure { message: String },

    #[error("failed to fetch schema for '{slug}': {message}")]
    SchemaFetch { slug: String, message: String },

    #[error("session has not been loaded")]
    NotLoaded,

    #[error("unknown developer object '{id}'")]
    UnknownObject { id: String },

    #[error("unknown API object '{id}'")]
    UnknownApiObject { id: String },

    #[error("mapping is incomplete")]
    IncompleteMapping,

    #[error("operation not available in the {stage} stage")]
    InvalidStage { stage: String },

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl SessionError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LoadFailure { .. } | Self::SaveFailure { .. } | Self::SchemaFetch { .. } => 3,
            Self::IncompleteMapping => 1,
            _ => 2,
        }
    }
}

/// Errors from structural edits that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown field '{slug}'")]
    UnknownField { slug: String },

    #[error("unknown parent field '{slug}'")]
    UnknownParentField { slug: String },

    #[error("field '{slug}' is not an object and cannot hold nested fields")]
    ParentNotObject { slug: String },

    #[error("field '{slug}' already exists")]
    DuplicateField { slug: String },

    #[error("'{pointer}' is not a compatible source for '{slug}'")]
    IneligibleSource { slug: String, pointer: String },

    #[error("unknown pointer '{pointer}'")]
    UnknownPointer { pointer: String },

    #[error("unknown event '{slug}'")]
    UnknownEvent { slug: String },

    #[error("event '{slug}' has no configured action")]
    EventNotConfigured { slug: String },

    #[error("event '{slug}' belongs to the {expected} stage")]
    WrongSide { slug: String, expected: String },

    #[error("row {index} out of bounds (len {len})")]
    RowOutOfBounds { index: usize, len: usize },

    #[error("event '{slug}' is not configured as a search action")]
    NotAFilterAction { slug: String },

    #[error("event '{slug}' is not configured as a create or update action")]
    NotAPayloadAction { slug: String },
}

/// Errors during static literal validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid value schema: {message}")]
    InvalidSchema { message: String },

    #[error("value failed validation with {} error(s)", errors.len())]
    Invalid { errors: Vec<ValueError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValueError {
    /// Field slug the value was assigned to.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_error_exit_codes() {
        let err = CollaboratorError::FileNotFound {
            path: PathBuf::from("objects.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = CollaboratorError::Status {
            url: "http://localhost/mapping".into(),
            status: 500,
        };
        assert_eq!(err.exit_code(), 3);

        let err = CollaboratorError::rejected("connection revoked");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn rejected_displays_bare_message() {
        let err = CollaboratorError::rejected("connection revoked");
        assert_eq!(err.to_string(), "connection revoked");
    }

    #[test]
    fn session_error_exit_codes() {
        let err = SessionError::LoadFailure {
            message: "boom".into(),
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(SessionError::IncompleteMapping.exit_code(), 1);
        assert_eq!(SessionError::NotLoaded.exit_code(), 2);
    }

    #[test]
    fn value_error_display() {
        let err = ValueError {
            path: "amount".into(),
            message: "\"abc\" is not of type \"number\"".into(),
        };
        assert_eq!(err.to_string(), "amount: \"abc\" is not of type \"number\"");
    }
}
