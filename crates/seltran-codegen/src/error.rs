//! Emission, naming and binding errors

use std::path::PathBuf;

use seltran_lower::LowerError;
use thiserror::Error;

use crate::traversal::TraversalId;

/// Translation of one prototype failed; the module has no output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("function {id} (line {line}): {source}")]
    Lower {
        id: TraversalId,
        /// `linedefined` of the failing prototype.
        line: u32,
        source: LowerError,
    },
}

/// The module name cannot be derived from the file names.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("input file {0} must have a .lua extension")]
    InputExtension(PathBuf),

    #[error("output file {0} must have a .c extension")]
    OutputExtension(PathBuf),

    #[error("the names of the input and output files must match ({input} vs {output})")]
    Mismatch { input: String, output: String },

    #[error("module name {0:?} is empty or has characters other than letters, digits and underscores")]
    InvalidName(String),
}

/// Why the host loader rejected the embedded source.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("not enough memory")]
    Memory,

    #[error("error in __gc metamethod: {0}")]
    Finalizer(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("cannot load embedded source: {0}")]
    Load(#[from] LoadFailure),

    /// The loaded tree does not have one prototype per dispatch entry.
    #[error("prototype count mismatch: dispatch table has {expected}, loaded tree has {found}")]
    CountMismatch { expected: usize, found: usize },
}
