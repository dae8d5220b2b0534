//! # Error Kinds
//!
//! All fallible operations in strata return `eyre::Result` with rich context.
//! In addition, failures that callers need to distinguish programmatically
//! carry a [`StorageError`] inside the report. The kind is recovered with
//! `Report::downcast_ref::<StorageError>()`, or the [`storage_error_kind`]
//! helper.
//!
//! ## Kinds
//!
//! - `InvalidArgument`: malformed options passed to a planning operation
//! - `OutOfRange`: file-offset arithmetic overflowed the addressable range
//! - `Io`: an underlying file operation failed or made no progress
//! - `DataLoss`: CRC mismatch, bad magic, unrecognized version, broken chain
//! - `NotFound`: a recovery UUID that was never indexed
//! - `AlreadyExists`: a duplicate UUID at indexing time
//!
//! The core never swallows its own errors; every kind propagates to the
//! caller unchanged.

/// Classifies a failure for callers that dispatch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    Io,
    DataLoss,
    NotFound,
    AlreadyExists,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::OutOfRange => "out of range",
            ErrorKind::Io => "i/o failure",
            ErrorKind::DataLoss => "data loss",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
        }
    }
}

#[derive(Debug)]
pub struct StorageError {
    kind: ErrorKind,
    message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for StorageError {}

/// Extracts the [`ErrorKind`] carried by a report, if any.
pub fn storage_error_kind(report: &eyre::Report) -> Option<ErrorKind> {
    report.downcast_ref::<StorageError>().map(StorageError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::{bail, Result};

    fn fails_with(kind: ErrorKind) -> Result<()> {
        bail!(StorageError::new(kind, "synthetic failure"));
    }

    #[test]
    fn kind_survives_report_roundtrip() {
        let err = fails_with(ErrorKind::DataLoss).unwrap_err();
        assert_eq!(storage_error_kind(&err), Some(ErrorKind::DataLoss));
    }

    #[test]
    fn kind_survives_wrapping_context() {
        use eyre::WrapErr;

        let err = fails_with(ErrorKind::NotFound)
            .wrap_err("while recovering device")
            .unwrap_err();

        assert_eq!(storage_error_kind(&err), Some(ErrorKind::NotFound));
    }

    #[test]
    fn display_includes_kind_name() {
        let err = StorageError::new(ErrorKind::AlreadyExists, "uuid indexed twice");
        let text = err.to_string();

        assert!(text.contains("already exists"));
        assert!(text.contains("uuid indexed twice"));
    }

    #[test]
    fn foreign_error_has_no_kind() {
        let report = eyre::eyre!("plain report");
        assert_eq!(storage_error_kind(&report), None);
    }
}
