//! Analyzer Protocol - Wire framing and record codecs for the ingest gateway
//!
//! This crate holds the byte layouts shared by the gateway, the upload
//! client and the pipeline stages:
//! - `Message` - Client → gateway frames (`BATCH`, `FIN`, `ERROR`)
//! - `Resource` - The three CSV datasets a client uploads
//! - `Record` / `FieldDictionary` - `id=value;...` record lines
//! - Batch and result envelopes exchanged with the broker
//! - Result frames streamed back to the client
//!
//! # Design Principles
//!
//! - **Pure**: no I/O; everything here is a function over byte buffers
//! - **Zero-copy where it matters**: payloads are `bytes::Bytes` slices
//! - **Tolerant reads, strict writes**: decoders skip what they do not
//!   recognise, encoders reject anything that would corrupt framing

mod dictionary;
mod envelope;
mod error;
mod message;
mod record;
mod resource;
mod result;

pub use dictionary::{FieldDictionary, STANDARD_FIELDS};
pub use envelope::{
    BatchEnvelope, EnvelopeKind, KIND_BATCH, KIND_EOF, KIND_ERROR, ResultEnvelope,
    decode_batch_envelope, decode_result_envelope, encode_batch_envelope, encode_eof_envelope,
    encode_error_envelope,
};
pub use error::{DecodeError, DictionaryError, EncodeError, ProtocolError};
pub use message::{
    DEFAULT_MAX_LINE_SIZE, LENGTH_PREFIX_SIZE, MSG_BATCH, MSG_ERROR, MSG_FIN, Message,
};
pub use record::{
    FIELD_SEPARATOR, KEY_VALUE_SEPARATOR, LINE_SEPARATOR, Record, decode_line, decode_lines,
    encode_line, encode_line_into,
};
pub use resource::Resource;
pub use result::{
    RESULT_HEADER_SIZE, RESULT_LENGTH_SIZE, decode_result_frame, known_queries, query_columns,
    read_result_length, render_error, render_eof, render_result_envelope, render_result_row,
    result_rows,
};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
