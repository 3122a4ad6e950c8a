//! Error types for the upload client

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use analyzer_protocol::{DecodeError, EncodeError, Resource};

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors while uploading files or receiving results
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the gateway
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Reading an input file or writing a result file failed
    #[error("I/O error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input file ended inside a quoted field
    #[error("{}: unterminated quoted field starting at line {line}", path.display())]
    UnterminatedQuote { path: PathBuf, line: u64 },

    /// Input file has no header row
    #[error("{}: missing header row", path.display())]
    MissingHeader { path: PathBuf },

    /// A single row exceeds the batch budget
    #[error("row of {size} bytes does not fit a batch of {batch_size} bytes; raise the batch size")]
    RowTooLarge { size: usize, batch_size: usize },

    /// A row could not be encoded as a record
    #[error("failed to encode row: {0}")]
    Encode(#[from] EncodeError),

    /// Writing to the gateway failed
    #[error("failed to send {resource}: {source}")]
    Send {
        resource: Resource,
        #[source]
        source: io::Error,
    },

    /// Reading from the gateway failed
    #[error("failed to receive results: {0}")]
    Receive(#[source] io::Error),

    /// Gateway closed the connection before every query finished
    #[error("gateway closed the connection with {pending} queries pending")]
    Disconnected { pending: usize },

    /// Malformed result frame
    #[error("invalid result frame: {0}")]
    Frame(#[from] DecodeError),

    /// Announced result frame exceeds the accepted size
    #[error("result frame of {size} bytes exceeds limit {max}")]
    FrameTooLarge { size: usize, max: usize },
}

impl ClientError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
