//! Batch packing under a byte budget
//!
//! A batch frame costs `1 + 4` bytes of header plus `4 + len` per line. Lines
//! are added while the frame stays within `batch_size`; the line that would
//! overflow it starts the next batch.

use bytes::Bytes;

use analyzer_protocol::{LENGTH_PREFIX_SIZE, Message};

use crate::error::{ClientError, Result};

/// Message kind plus line count
const BATCH_HEADER_SIZE: usize = 1 + LENGTH_PREFIX_SIZE;

/// Accumulates lines into `BATCH` messages
#[derive(Debug)]
pub struct BatchPacker {
    batch_size: usize,
    lines: Vec<Bytes>,
    /// Bytes of the pending lines, length prefixes included
    size: usize,
}

impl BatchPacker {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            lines: Vec::new(),
            size: 0,
        }
    }

    /// Whether a line of `len` bytes still fits the pending batch
    pub fn fits(&self, len: usize) -> bool {
        BATCH_HEADER_SIZE + self.size + LENGTH_PREFIX_SIZE + len <= self.batch_size
    }

    /// Add a line, returning the batch it pushed out if any
    ///
    /// A line too large for an empty batch is rejected.
    pub fn push(&mut self, line: Bytes) -> Result<Option<Message>> {
        if BATCH_HEADER_SIZE + LENGTH_PREFIX_SIZE + line.len() > self.batch_size {
            return Err(ClientError::RowTooLarge {
                size: line.len(),
                batch_size: self.batch_size,
            });
        }

        let full = if self.fits(line.len()) {
            None
        } else {
            self.take()
        };
        self.append(line);
        Ok(full)
    }

    /// The pending batch, if it holds any line
    pub fn take(&mut self) -> Option<Message> {
        if self.lines.is_empty() {
            return None;
        }
        self.size = 0;
        Some(Message::Batch(std::mem::take(&mut self.lines)))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn append(&mut self, line: Bytes) {
        self.size += LENGTH_PREFIX_SIZE + line.len();
        self.lines.push(line);
    }
}
