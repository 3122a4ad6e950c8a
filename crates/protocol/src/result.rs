//! Client-bound result frames
//!
//! Results travel to the client as:
//! ```text
//! ┌──────────────┬────────┬─────────┬──────────────────────────────┐
//! │ 4 bytes      │ 1 byte │ 1 byte  │ N bytes                      │
//! │ length (BE)  │ kind   │ query   │ rows joined by '\n'          │
//! └──────────────┴────────┴─────────┴──────────────────────────────┘
//! ```
//!
//! `length` covers kind + query + payload. Each row is the query's column
//! projection rendered as comma-separated trimmed values; `genres` is
//! wrapped in brackets to keep its list semantics inside one CSV cell.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::envelope::{EnvelopeKind, ResultEnvelope, decode_result_envelope};
use crate::error::{DecodeError, EncodeError};
use crate::record::{LINE_SEPARATOR, Record};

/// Length prefix size of a result frame
pub const RESULT_LENGTH_SIZE: usize = 4;

/// Kind + query header size
pub const RESULT_HEADER_SIZE: usize = 2;

/// Column rendered as `[value]`
const LIST_COLUMN: &str = "genres";

/// Column projection per query, in output order
const QUERY_COLUMNS: [(u8, &[&str]); 5] = [
    (1, &["title", "genres"]),
    (2, &["country", "budget"]),
    (3, &["title", "rating"]),
    (4, &["actor", "count"]),
    (5, &["sentiment", "rate_revenue_budget"]),
];

/// Columns a query's result rows must carry
pub fn query_columns(query: u8) -> Option<&'static [&'static str]> {
    QUERY_COLUMNS
        .iter()
        .find(|(q, _)| *q == query)
        .map(|(_, cols)| *cols)
}

/// Every query id that has a projection
pub fn known_queries() -> impl Iterator<Item = u8> {
    QUERY_COLUMNS.iter().map(|(q, _)| *q)
}

/// Render one record as the query's CSV row
pub fn render_result_row(record: &Record, query: u8) -> Result<Vec<u8>, EncodeError> {
    let columns = query_columns(query).ok_or(EncodeError::UnknownQuery(query))?;
    let mut row = Vec::with_capacity(64);

    for (i, &column) in columns.iter().enumerate() {
        let value = record
            .get(column)
            .ok_or(EncodeError::MissingColumn { query, column })?
            .trim();

        if i > 0 {
            row.push(b',');
        }
        if column == LIST_COLUMN {
            row.push(b'[');
            row.extend_from_slice(value.as_bytes());
            row.push(b']');
        } else {
            row.extend_from_slice(value.as_bytes());
        }
    }

    Ok(row)
}

/// Assemble a full client frame
///
/// The length prefix is written after the payload so it always matches what
/// was actually encoded.
pub fn render_result_envelope<R: AsRef<[u8]>>(kind: EnvelopeKind, query: u8, rows: &[R]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RESULT_LENGTH_SIZE + RESULT_HEADER_SIZE + 64 * rows.len());
    buf.put_u32(0);
    buf.put_u8(kind.to_u8());
    buf.put_u8(query);
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            buf.put_u8(LINE_SEPARATOR);
        }
        buf.put_slice(row.as_ref());
    }

    let len = (buf.len() - RESULT_LENGTH_SIZE) as u32;
    buf[0..RESULT_LENGTH_SIZE].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

/// Client frame signalling a query finished
pub fn render_eof(query: u8) -> Bytes {
    render_result_envelope::<&[u8]>(EnvelopeKind::Eof, query, &[])
}

/// Client frame signalling a query failed
pub fn render_error(query: u8) -> Bytes {
    render_result_envelope::<&[u8]>(EnvelopeKind::Error, query, &[])
}

/// Read the length prefix of a result frame
pub fn read_result_length(buf: &[u8]) -> Option<u32> {
    if buf.len() < RESULT_LENGTH_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Decode a complete result frame, length prefix included
pub fn decode_result_frame(mut frame: Bytes) -> Result<ResultEnvelope, DecodeError> {
    let declared = read_result_length(&frame).ok_or(DecodeError::TooShort {
        expected: RESULT_LENGTH_SIZE + RESULT_HEADER_SIZE,
        actual: frame.len(),
    })? as usize;
    frame.advance(RESULT_LENGTH_SIZE);
    if declared != frame.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    decode_result_envelope(frame)
}

/// Split a result frame body into rows
pub fn result_rows(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload
        .split(|b| *b == LINE_SEPARATOR)
        .filter(|row| !row.is_empty())
}

#[cfg(test)]
#[path = "result_test.rs"]
mod tests;
