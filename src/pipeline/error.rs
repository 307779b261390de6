//! Error types for the analysis pipeline.
//!
//! Every failure carries the [`Stage`] it happened in so the caller can report
//! which step and which precondition failed. All variants are fatal to the
//! current run; nothing in the pipeline retries.

use polars::prelude::PolarsError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage where an error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clean,
    Merge,
    Prepare,
    Outliers,
    Model,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Clean => "clean",
            Stage::Merge => "merge",
            Stage::Prepare => "prepare",
            Stage::Outliers => "outliers",
            Stage::Model => "model",
        };
        write!(f, "{}", name)
    }
}

/// Coarse error taxonomy exposed to callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required column missing or malformed
    Schema,
    /// Invalid parameter
    Config,
    /// Phase invoked out of order
    State,
    /// Operation on an empty or degenerate partition
    Data,
    /// Underlying table operation failed
    Table,
}

/// Errors produced by the cleaning, merging, preparation and modeling stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[{stage}] schema error: column '{column}' {detail}")]
    Schema {
        stage: Stage,
        column: String,
        detail: String,
    },

    #[error("[{stage}] config error: {message}")]
    Config { stage: Stage, message: String },

    #[error("[{stage}] state error: {message}")]
    State { stage: Stage, message: String },

    #[error("[{stage}] data error: {message}")]
    Data { stage: Stage, message: String },

    #[error("[{stage}] table operation failed: {source}")]
    Table {
        stage: Stage,
        #[source]
        source: PolarsError,
    },
}

impl PipelineError {
    pub fn missing_column(stage: Stage, column: &str) -> Self {
        PipelineError::Schema {
            stage,
            column: column.to_string(),
            detail: "is missing".to_string(),
        }
    }

    pub fn malformed_column(stage: Stage, column: &str, detail: impl Into<String>) -> Self {
        PipelineError::Schema {
            stage,
            column: column.to_string(),
            detail: detail.into(),
        }
    }

    pub fn config(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Config {
            stage,
            message: message.into(),
        }
    }

    pub fn state(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::State {
            stage,
            message: message.into(),
        }
    }

    pub fn data(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Data {
            stage,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Schema { .. } => ErrorKind::Schema,
            PipelineError::Config { .. } => ErrorKind::Config,
            PipelineError::State { .. } => ErrorKind::State,
            PipelineError::Data { .. } => ErrorKind::Data,
            PipelineError::Table { .. } => ErrorKind::Table,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Schema { stage, .. }
            | PipelineError::Config { stage, .. }
            | PipelineError::State { stage, .. }
            | PipelineError::Data { stage, .. }
            | PipelineError::Table { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Attach a stage to a polars result
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> AtStage<T> for std::result::Result<T, PolarsError> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|source| PipelineError::Table { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_stage_and_column() {
        let err = PipelineError::missing_column(Stage::Merge, "GeoName");
        assert_eq!(err.to_string(), "[merge] schema error: column 'GeoName' is missing");
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.stage(), Stage::Merge);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(PipelineError::config(Stage::Prepare, "x").kind(), ErrorKind::Config);
        assert_eq!(PipelineError::state(Stage::Model, "x").kind(), ErrorKind::State);
        assert_eq!(PipelineError::data(Stage::Model, "x").kind(), ErrorKind::Data);
    }
}
