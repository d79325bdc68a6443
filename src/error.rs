use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while converting a record corpus into tables
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A column would collide with the generated `id` column
    #[error("Invalid name {column:?} found in tag {tag:?} within element {record_type:?}")]
    InvalidColumnName {
        column: String,
        tag: String,
        record_type: String,
    },

    /// The event stream could not be parsed or failed validation
    #[error("invalid source document: {0}")]
    Source(String),

    /// The schema file could not be read or declares nothing usable
    #[error("schema error in {}: {message}", path.display())]
    Schema { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write delimited output: {0}")]
    Csv(#[from] csv::Error),

    /// Two outputs of one run would be written to the same file
    #[error("output file {} would be written more than once; rename the relation", path.display())]
    OutputCollision { path: PathBuf },

    /// An invariant of the two-pass pipeline did not hold
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
