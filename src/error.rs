use std::num::ParseFloatError;
use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::RowId;

/// Setup problems. Always reported before any input is read or output written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tolerance value '{text}' is not a number")]
    InvalidTolerance {
        text: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("tolerance magnitude must be non-negative and finite, got {0}")]
    InvalidMagnitude(f64),

    #[error("{0} is not set")]
    Unset(&'static str),

    #[error("filename template is empty")]
    EmptyTemplate,

    #[error("filename template '{0}' contains more than one '{{}}' marker")]
    MultipleMarkers(String),

    #[error("unknown sample '{0}'")]
    UnknownSample(String),

    #[error("sample order lists {given} samples but the input has {expected}")]
    SampleOrderMismatch { given: usize, expected: usize },
}

/// Terminal failure of one export run.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("writing {} failed{}: {source}", .path.display(), at_row(.row))]
    Io {
        row: Option<RowId>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing CSV {} failed{}: {source}", .path.display(), at_row(.row))]
    Csv {
        row: Option<RowId>,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ExportError {
    /// Row that was being written when the failure happened, if any.
    pub fn row(&self) -> Option<RowId> {
        match self {
            ExportError::Io { row, .. } | ExportError::Csv { row, .. } => *row,
        }
    }
}

fn at_row(row: &Option<RowId>) -> String {
    match row {
        Some(id) => format!(" at row {id}"),
        None => String::new(),
    }
}
