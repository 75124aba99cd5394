//! Import error taxonomy
//!
//! Format and parse errors are terminal for one upload attempt. Row-level
//! problems never show up here; they are collected as `InvalidRow` data.

use thiserror::Error;

use crate::types::StoredGuest;

/// Terminal failure of an import attempt or session operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Extension is not one of csv, xlsx, xls
    #[error("Unsupported file format '{filename}' (expected .csv, .xlsx or .xls)")]
    UnsupportedFormat { filename: String },

    /// Content could not be read as a table
    #[error("Failed to parse '{filename}': {message}")]
    ParseFailure { filename: String, message: String },

    #[error("File '{filename}' is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    /// The parse was abandoned (new file selected, session cancelled)
    #[error("Import was cancelled")]
    Cancelled,

    #[error("Cannot {action} while the import is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    /// Storage rejected the batch; `committed` lists guest ids it reports as written
    #[error("Storing guests failed ({} committed): {message}", committed.len())]
    Storage { committed: Vec<u32>, message: String },
}

impl ImportError {
    pub fn parse_failure(filename: &str, message: impl std::fmt::Display) -> Self {
        ImportError::ParseFailure {
            filename: filename.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable code used in `ErrorResponse`
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ImportError::ParseFailure { .. } => "PARSE_FAILURE",
            ImportError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ImportError::Cancelled => "CANCELLED",
            ImportError::InvalidState { .. } => "INVALID_STATE",
            ImportError::Storage { .. } => "STORAGE_FAILURE",
        }
    }
}

/// Failure reported by a guest storage backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Nothing from the batch was kept
    #[error("{message}")]
    Failed { message: String },

    /// Some guests were written before the failure
    #[error("{message}")]
    Partial {
        committed: Vec<StoredGuest>,
        message: String,
    },
}

impl StoreError {
    pub fn committed(&self) -> &[StoredGuest] {
        match self {
            StoreError::Failed { .. } => &[],
            StoreError::Partial { committed, .. } => committed,
        }
    }
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        let committed = err.committed().iter().map(|g| g.record_id).collect();
        ImportError::Storage {
            committed,
            message: err.to_string(),
        }
    }
}
