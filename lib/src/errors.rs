use std::fmt;
use std::result::Result as StdResult;

use thiserror::Error;

/// The step of an operation a per-file failure happened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Counting,
    Committing,
    Reconciling,
    Extracting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Counting => "counting",
            Phase::Committing => "committing",
            Phase::Reconciling => "reconciling",
            Phase::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum KmerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse the fasta/fastq file: {0}")]
    Parse(#[from] needletail::errors::ParseError),
    #[error("store error: {0}")]
    Store(#[from] redb::Error),
    #[error("store capacity exceeded: {0}")]
    Capacity(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("json error: {0:?}")]
    Json(#[from] serde_json::Error),
    #[error("could not shape count matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("{phase} {file} failed: {source}")]
    File {
        file: String,
        phase: Phase,
        #[source]
        source: Box<KmerError>,
    },
}

impl KmerError {
    pub fn io(path: &str, source: std::io::Error) -> Self {
        KmerError::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Attach the file identifier and phase to an error, unless it already
    /// carries them.
    pub fn in_file(self, file: &str, phase: Phase) -> Self {
        match self {
            e @ KmerError::File { .. } => e,
            e => KmerError::File {
                file: file.to_string(),
                phase,
                source: Box::new(e),
            },
        }
    }

    /// The failing file and phase, if known.
    pub fn file_phase(&self) -> Option<(&str, Phase)> {
        match self {
            KmerError::File { file, phase, .. } => Some((file, *phase)),
            _ => None,
        }
    }

    /// The innermost error, looking through any `File` wrapper.
    pub fn root(&self) -> &KmerError {
        match self {
            KmerError::File { source, .. } => source.root(),
            e => e,
        }
    }
}

// redb splits its failures over several types; they all funnel into
// `redb::Error`
macro_rules! from_redb {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KmerError {
                fn from(e: $ty) -> Self {
                    KmerError::Store(redb::Error::from(e))
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

pub type KmerResult<T> = StdResult<T, KmerError>;

#[doc(hidden)]
#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::KmerError::Validation($e.to_owned()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::KmerError::Validation(format!($fmt, $($arg)*)))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! format_err {
    ($($arg:tt)*) => { $crate::errors::KmerError::Validation(format!($($arg)*)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_context_is_not_nested() {
        let err = KmerError::Validation("bad".to_string())
            .in_file("a.fa", Phase::Counting)
            .in_file("a.fa", Phase::Committing);
        assert_eq!(err.file_phase(), Some(("a.fa", Phase::Counting)));
        assert!(matches!(err.root(), KmerError::Validation(_)));
        assert_eq!(err.to_string(), "counting a.fa failed: invalid input: bad");
    }
}
