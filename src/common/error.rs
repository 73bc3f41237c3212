//! Error handling primitives shared across the core.
//!
//! Every failure in an annotation run is fatal. The variants carry enough
//! context (file, partition, tree, row) for a single diagnostic line.

use std::io;
use std::path::PathBuf;

use crate::inference::domain::InferenceError;

/// Stable error codes, used as the process exit status.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Input container path does not exist.
    MissingInput = 1,
    /// Container could not be opened, parsed or locked.
    ContainerOpen = 2,
    /// A matched partition has no readable row-table.
    PartitionResolution = 3,
    /// A configured field is absent or an output field already exists.
    SchemaBinding = 4,
    /// Preprocessing, classification or reduction failed for a row.
    Inference = 5,
    /// Requested model artefact was not available or malformed.
    ModelMissing = 6,
    /// Configuration failed validation.
    InvalidInput = 7,
    /// Final write of the container failed.
    Persist = 8,
}

/// Canonical error type for the core.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("input file {} does not exist", path.display())]
    MissingInput { path: PathBuf },

    #[error("failed to open container {}: {reason}", path.display())]
    ContainerOpen { path: PathBuf, reason: String },

    #[error("container {} is locked by another writer", path.display())]
    ContainerLocked { path: PathBuf },

    #[error("directory {partition} appears more than once in the container")]
    DuplicatePartition { partition: String },

    #[error("tree {table} in directory {partition} is malformed: {reason}")]
    MalformedTable {
        partition: String,
        table: String,
        reason: String,
    },

    #[error("failed to find tree {table} in directory {partition}")]
    PartitionResolution { partition: String, table: String },

    #[error("field {field} not found in {partition}/{table}")]
    SchemaBinding {
        partition: String,
        table: String,
        field: String,
    },

    #[error("output field {field} already exists in {partition}/{table}")]
    ColumnExists {
        partition: String,
        table: String,
        field: String,
    },

    #[error("inference failed in {partition} at row {row} (event {event}): {source}")]
    Inference {
        partition: String,
        row: usize,
        event: i64,
        #[source]
        source: InferenceError,
    },

    #[error("event field {field} in {partition} holds a non-finite value at row {row}")]
    InvalidEvent {
        partition: String,
        row: usize,
        field: String,
    },

    #[error("no class scored above the sentinel in {partition} at row {row} (event {event})")]
    UnresolvedArgmax {
        partition: String,
        row: usize,
        event: i64,
    },

    #[error("failed to load artefact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("invalid ensemble: {0}")]
    Ensemble(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("refusing to write inconsistent container: {0}")]
    Inconsistent(String),

    #[error("failed to write container {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result alias used throughout the crate.
pub type AnnotateResult<T> = Result<T, AnnotateError>;

impl AnnotateError {
    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            AnnotateError::MissingInput { .. } => ErrorCode::MissingInput,
            AnnotateError::ContainerOpen { .. }
            | AnnotateError::ContainerLocked { .. }
            | AnnotateError::DuplicatePartition { .. }
            | AnnotateError::MalformedTable { .. } => ErrorCode::ContainerOpen,
            AnnotateError::PartitionResolution { .. } => ErrorCode::PartitionResolution,
            AnnotateError::SchemaBinding { .. } | AnnotateError::ColumnExists { .. } => {
                ErrorCode::SchemaBinding
            }
            AnnotateError::Inference { .. }
            | AnnotateError::InvalidEvent { .. }
            | AnnotateError::UnresolvedArgmax { .. } => ErrorCode::Inference,
            AnnotateError::Artifact { .. } => ErrorCode::ModelMissing,
            AnnotateError::Ensemble(_) | AnnotateError::Config(_) => ErrorCode::InvalidInput,
            AnnotateError::Inconsistent(_) | AnnotateError::Persist { .. } => ErrorCode::Persist,
        }
    }

    /// Container open helper.
    pub fn container_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ContainerOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Artefact helper.
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Configuration helper.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::MissingInput as u32, 1);
        assert_eq!(ErrorCode::ContainerOpen as u32, 2);
        assert_eq!(ErrorCode::PartitionResolution as u32, 3);
        assert_eq!(ErrorCode::SchemaBinding as u32, 4);
        assert_eq!(ErrorCode::Inference as u32, 5);
        assert_eq!(ErrorCode::ModelMissing as u32, 6);
        assert_eq!(ErrorCode::InvalidInput as u32, 7);
        assert_eq!(ErrorCode::Persist as u32, 8);
    }

    #[test]
    fn messages_name_the_failing_location() {
        let err = AnnotateError::PartitionResolution {
            partition: "mt_1".into(),
            table: "ntuple".into(),
        };
        assert_eq!(err.to_string(), "failed to find tree ntuple in directory mt_1");
        assert_eq!(err.code(), ErrorCode::PartitionResolution);

        let err = AnnotateError::ColumnExists {
            partition: "mt_0".into(),
            table: "ntuple".into(),
            field: "nn_max_score".into(),
        };
        assert_eq!(err.code(), ErrorCode::SchemaBinding);
        assert!(err.to_string().contains("mt_0/ntuple"));

        let err = AnnotateError::InvalidEvent {
            partition: "mt_0".into(),
            row: 3,
            field: "event".into(),
        };
        assert_eq!(err.code(), ErrorCode::Inference);
        assert_eq!(
            err.to_string(),
            "event field event in mt_0 holds a non-finite value at row 3"
        );

        let err = AnnotateError::MalformedTable {
            partition: "mt_0".into(),
            table: "ntuple".into(),
            reason: "short".into(),
        };
        assert_eq!(err.code(), ErrorCode::ContainerOpen);
    }
}
