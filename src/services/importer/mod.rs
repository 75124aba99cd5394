//! Guest import pipeline
//!
//! File → parser → column mapper → row validator → summary. The pipeline is
//! synchronous; callers run it on a blocking thread and observe progress
//! through phase markers.

pub mod column_mapper;
pub mod parser;
pub mod summary;
pub mod template;
pub mod validator;

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ImportError;
use crate::types::{ImportPhase, ImportResult, UploadedFile};

use summary::ResultBuilder;

/// Rows validated between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 500;

pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Runs the import pipeline for one file at a time
#[derive(Debug, Clone)]
pub struct GuestImporter {
    max_file_bytes: usize,
}

impl Default for GuestImporter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES)
    }
}

impl GuestImporter {
    pub fn new(max_file_bytes: usize) -> Self {
        Self { max_file_bytes }
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Reject files the pipeline would never accept, without reading them
    pub fn check_file(&self, file: &UploadedFile) -> Result<(), ImportError> {
        file.format()?;
        if file.size() > self.max_file_bytes {
            return Err(ImportError::FileTooLarge {
                filename: file.filename.clone(),
                size: file.size(),
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Run the whole pipeline. Validation failures are part of the result;
    /// only format, parse and cancellation problems are errors.
    pub fn run<F>(
        &self,
        file: &UploadedFile,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Result<ImportResult, ImportError>
    where
        F: FnMut(ImportPhase),
    {
        let start_time = Instant::now();
        info!("Importing guests from '{}' ({} bytes)", file.filename, file.size());

        progress(ImportPhase::Reading);
        if let Err(e) = self.check_file(file) {
            warn!("Rejected upload '{}': {}", file.filename, e);
            return Err(e);
        }
        let format = file.format()?;
        checkpoint(cancel)?;

        progress(ImportPhase::Parsing);
        let sheet = parser::parse(file).map_err(|e| {
            warn!("Failed to parse '{}': {}", file.filename, e);
            e
        })?;
        checkpoint(cancel)?;

        progress(ImportPhase::Mapping);
        let mapping = column_mapper::map_columns(&sheet.headers);
        checkpoint(cancel)?;

        progress(ImportPhase::Validating);
        let mut builder = ResultBuilder::new(&file.filename, format, mapping);
        for (idx, row) in sheet.rows.iter().enumerate() {
            if idx > 0 && idx % CANCEL_CHECK_INTERVAL == 0 {
                checkpoint(cancel)?;
            }
            builder.push(row);
        }
        checkpoint(cancel)?;

        progress(ImportPhase::Summarizing);
        let result = builder.finish();

        progress(ImportPhase::Done);
        info!(
            "Import of '{}' finished in {}ms: {} rows, {} valid, {} rejected, hits {:?}",
            file.filename,
            start_time.elapsed().as_millis(),
            result.total_rows,
            result.valid_guests.len(),
            result.invalid_rows.len(),
            summary::hits_by_key(&result)
        );

        Ok(result)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), ImportError> {
    if cancel.is_cancelled() {
        return Err(ImportError::Cancelled);
    }
    Ok(())
}
