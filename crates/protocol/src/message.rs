//! Client wire messages
//!
//! After a resource byte the client sends a sequence of messages:
//!
//! ```text
//! ┌─────────┬──────────────────────────────────────────────────────┐
//! │ 1 byte  │ BATCH only                                           │
//! │ kind    │ count:u32 BE, then count × (len:u32 BE, len bytes)   │
//! └─────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! `FIN` and `ERROR` carry no payload. Reading is done by the gateway's
//! frame reader; this module owns the constants and the client-side encoder.

use bytes::{BufMut, Bytes, BytesMut};

/// Message kind discriminants
pub const MSG_BATCH: u8 = 0;
pub const MSG_FIN: u8 = 1;
pub const MSG_ERROR: u8 = 2;

/// Size of the batch line count and of each line length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum size of a single line (16MB)
pub const DEFAULT_MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// One client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Raw CSV rows, in file order
    Batch(Vec<Bytes>),
    /// End of the current resource
    Fin,
    /// Client aborted the upload
    Error,
}

impl Message {
    /// Kind byte for this message
    pub fn kind(&self) -> u8 {
        match self {
            Message::Batch(_) => MSG_BATCH,
            Message::Fin => MSG_FIN,
            Message::Error => MSG_ERROR,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append wire bytes to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind());
        if let Message::Batch(lines) = self {
            buf.put_u32(lines.len() as u32);
            for line in lines {
                buf.put_u32(line.len() as u32);
                buf.put_slice(line);
            }
        }
    }

    /// Exact number of bytes `encode` produces
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::Batch(lines) => {
                1 + LENGTH_PREFIX_SIZE
                    + lines
                        .iter()
                        .map(|l| LENGTH_PREFIX_SIZE + l.len())
                        .sum::<usize>()
            }
            Message::Fin | Message::Error => 1,
        }
    }

    /// Number of lines carried (0 for markers)
    pub fn line_count(&self) -> usize {
        match self {
            Message::Batch(lines) => lines.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
