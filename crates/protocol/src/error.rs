//! Protocol error types
//!
//! Errors raised while framing client traffic or translating records and
//! envelopes between the gateway and the pipeline stages.

use std::io;

use thiserror::Error;

/// Errors on the client ↔ gateway byte stream
///
/// Every variant is connection-fatal: the stream state is unknown after any
/// of them and the connection must be closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Resource identifier byte does not map to a known resource
    #[error("unknown resource id: {0}")]
    UnknownResource(u8),

    /// Message kind byte is not BATCH, FIN or ERROR
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u8),

    /// Peer closed the stream in the middle of a frame
    #[error("connection closed while reading {field}")]
    ConnectionClosed { field: &'static str },

    /// Announced line exceeds the configured limit
    #[error("line size {size} exceeds limit {max}")]
    LineTooLarge { size: usize, max: usize },

    /// Same resource announced twice on one connection
    #[error("resource '{0}' was already received on this connection")]
    DuplicateResource(&'static str),

    /// Peer is gone while writing
    #[error("broken pipe: {0}")]
    BrokenPipe(#[source] io::Error),

    /// Any other socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Map a read failure, turning a short read into `ConnectionClosed`
    pub fn from_read(err: io::Error, field: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed { field }
        } else {
            Self::Io(err)
        }
    }

    /// Map a write failure, turning a reset peer into `BrokenPipe`
    pub fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Self::BrokenPipe(err),
            _ => Self::Io(err),
        }
    }

    /// True when the peer simply went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. } | Self::BrokenPipe(_))
    }
}

/// Errors decoding envelopes coming from the broker
///
/// Scoped to a single message: the caller skips the message and continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Envelope is shorter than its fixed header
    #[error("envelope too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Envelope kind byte is not BATCH, EOF or ERROR
    #[error("unknown envelope kind: {0}")]
    UnknownKind(u8),

    /// Length prefix disagrees with the bytes present
    #[error("length prefix says {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Errors encoding records or rendering results
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Field name has no id in the dictionary
    #[error("field '{0}' is not part of the field dictionary")]
    UnknownField(String),

    /// Value contains a byte the record format uses as a separator
    #[error("value of field '{field}' contains reserved byte {byte:?}")]
    ReservedByte { field: String, byte: char },

    /// Query id has no column projection
    #[error("query {0} has no result projection")]
    UnknownQuery(u8),

    /// Record lacks a column the query projection requires
    #[error("query {query} requires column '{column}'")]
    MissingColumn { query: u8, column: &'static str },
}

/// Errors building a field dictionary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DictionaryError {
    /// No field names given
    #[error("field dictionary is empty")]
    Empty,

    /// Field name appears twice
    #[error("field '{0}' appears more than once")]
    Duplicate(String),

    /// Field name is blank or contains a separator
    #[error("invalid field name {0:?}")]
    InvalidName(String),

    /// More names than ids available
    #[error("field dictionary has {0} entries, maximum is {max}", max = u16::MAX as usize + 1)]
    TooLarge(usize),
}
