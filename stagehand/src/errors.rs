//! Error types for stagehand.
//!
//! Stage failures are not errors: they are [`crate::core::StageResult`] values
//! that the runner records and may retry. The types here cover what aborts a
//! run outright or never lets it start.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stagehand operations.
#[derive(Debug, Error)]
pub enum StagehandError {
    /// The pipeline references a stage that was never loaded.
    #[error("{0}")]
    Config(#[from] MissingStageError),

    /// A stage definition could not be loaded.
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pipeline entry names a stage absent from the loaded set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' (pipeline position {index}) is not defined")]
pub struct MissingStageError {
    /// The missing stage name.
    pub stage: String,
    /// Its position in the pipeline order.
    pub index: usize,
}

impl MissingStageError {
    /// Creates a new missing stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, index: usize) -> Self {
        Self {
            stage: stage.into(),
            index,
        }
    }
}

/// Errors raised while loading stage definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The definitions directory does not exist.
    #[error("Stage definitions directory not found: {}", path.display())]
    DirectoryNotFound {
        /// The directory path.
        path: PathBuf,
    },

    /// The directory holds no definitions.
    #[error("No stage definitions loaded from {}", path.display())]
    Empty {
        /// The directory path.
        path: PathBuf,
    },

    /// The file has no YAML frontmatter block.
    #[error("No YAML frontmatter found in stage file: {}", path.display())]
    MissingFrontmatter {
        /// The file path.
        path: PathBuf,
    },

    /// The frontmatter block is not terminated.
    #[error("Incomplete YAML frontmatter in stage file: {}", path.display())]
    IncompleteFrontmatter {
        /// The file path.
        path: PathBuf,
    },

    /// The frontmatter is not valid YAML for a stage.
    #[error("Invalid frontmatter in {}: {message}", path.display())]
    InvalidYaml {
        /// The file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A required field is missing.
    #[error("Stage '{stage}' missing '{field}' in {}", path.display())]
    MissingField {
        /// The stage name.
        stage: String,
        /// The missing field.
        field: &'static str,
        /// The file path.
        path: PathBuf,
    },

    /// The definition could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Failures inside the TTY adapter.
#[derive(Debug, Error)]
pub enum TtyError {
    /// No pseudoterminal could be allocated; the fallback transport applies.
    #[error("pseudoterminal allocation failed: {0}")]
    Allocation(String),

    /// The tool could not be launched.
    #[error("{0}")]
    Spawn(#[source] std::io::Error),

    /// Reading, writing or waiting failed after launch.
    #[error("pty I/O failed: {0}")]
    Io(String),
}

impl TtyError {
    /// Returns true if the fallback transport should be tried.
    #[must_use]
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::Allocation(_))
    }
}
