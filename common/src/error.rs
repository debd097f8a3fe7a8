use std::{io, path::PathBuf};

use thiserror::Error;

/// Everything that can stop a single operation's chart from being produced.
///
/// Each variant is fatal for the operation it occurs in, other operations keep going.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Could not read result file {path:?}: {source}")]
    MissingFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed record in {path:?} at line {line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Series for {operation} do not line up: {reason}")]
    AlignmentMismatch { operation: String, reason: String },
    #[error("Nothing to plot for {operation}")]
    EmptyChart { operation: String },
    #[error("Could not draw the {operation} chart: {reason}")]
    Render { operation: String, reason: String },
    #[error("Could not write {path:?}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Variant discovery for {operation} in {dir:?} failed: {reason}")]
    Discovery {
        operation: String,
        dir: PathBuf,
        reason: String,
    },
    #[error("Invalid config: {0}")]
    Config(String),
}
