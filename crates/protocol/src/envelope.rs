//! Broker envelopes
//!
//! Gateway → stage (batch envelope):
//! ```text
//! [kind:1][payload: newline-joined encoded records]
//! ```
//!
//! Terminal stage → gateway (result envelope):
//! ```text
//! [kind:1][query:1][payload]
//! ```
//!
//! `EOF` and `ERROR` envelopes carry an empty payload on both links.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DecodeError;
use crate::record::LINE_SEPARATOR;

/// Envelope kind discriminants
pub const KIND_BATCH: u8 = 0;
pub const KIND_EOF: u8 = 1;
pub const KIND_ERROR: u8 = 2;

/// Kind byte shared by batch and result envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeKind {
    Batch = KIND_BATCH,
    Eof = KIND_EOF,
    Error = KIND_ERROR,
}

impl EnvelopeKind {
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            KIND_BATCH => Some(Self::Batch),
            KIND_EOF => Some(Self::Eof),
            KIND_ERROR => Some(Self::Error),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Eof => "eof",
            Self::Error => "error",
        }
    }
}

/// Data envelope: `BATCH` byte followed by the lines joined with `\n`
pub fn encode_batch_envelope<L: AsRef<[u8]>>(lines: &[L]) -> Bytes {
    let payload_len: usize = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut buf = BytesMut::with_capacity(1 + payload_len);
    buf.put_u8(KIND_BATCH);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            buf.put_u8(LINE_SEPARATOR);
        }
        buf.put_slice(line.as_ref());
    }
    buf.freeze()
}

/// End-of-input marker for one resource
pub fn encode_eof_envelope() -> Bytes {
    Bytes::from_static(&[KIND_EOF])
}

/// Abort marker for one resource
pub fn encode_error_envelope() -> Bytes {
    Bytes::from_static(&[KIND_ERROR])
}

/// Decoded batch envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEnvelope {
    pub kind: EnvelopeKind,
    pub payload: Bytes,
}

/// Split a gateway → stage envelope into kind and payload
pub fn decode_batch_envelope(mut body: Bytes) -> Result<BatchEnvelope, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::TooShort {
            expected: 1,
            actual: 0,
        });
    }
    let byte = body.get_u8();
    let kind = EnvelopeKind::from_u8(byte).ok_or(DecodeError::UnknownKind(byte))?;
    Ok(BatchEnvelope {
        kind,
        payload: body,
    })
}

/// Query-tagged envelope produced by a terminal stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    pub kind: EnvelopeKind,
    pub query: u8,
    pub payload: Bytes,
}

impl ResultEnvelope {
    pub fn new(kind: EnvelopeKind, query: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            query,
            payload: payload.into(),
        }
    }

    /// Encode as a terminal stage publishes it
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u8(self.kind.to_u8());
        buf.put_u8(self.query);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Split a result envelope into kind, query id and payload
pub fn decode_result_envelope(mut body: Bytes) -> Result<ResultEnvelope, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::TooShort {
            expected: 2,
            actual: body.len(),
        });
    }
    let byte = body.get_u8();
    let query = body.get_u8();
    let kind = EnvelopeKind::from_u8(byte).ok_or(DecodeError::UnknownKind(byte))?;
    Ok(ResultEnvelope {
        kind,
        query,
        payload: body,
    })
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
