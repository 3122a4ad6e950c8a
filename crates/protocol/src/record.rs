//! Record codec
//!
//! A record is one row as a field-name → value map. On the broker it travels
//! as `id=value` pairs joined by `;`:
//!
//! ```text
//! 0=603;1=The Matrix;4=63000000
//! ```
//!
//! Encoding is strict (every field must be in the dictionary). Decoding is
//! tolerant: pairs without `=`, with a non-numeric key, or with an id the
//! dictionary does not know are skipped. Upstream stages may emit fields a
//! reader does not care about.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::dictionary::FieldDictionary;
use crate::error::EncodeError;

/// Separator between pairs
pub const FIELD_SEPARATOR: u8 = b';';

/// Separator between id and value
pub const KEY_VALUE_SEPARATOR: u8 = b'=';

/// Separator between records in a batch payload
pub const LINE_SEPARATOR: u8 = b'\n';

/// One decoded row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(name.into(), value.into())
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// True if the field is present
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field is present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields ordered by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Encode a record as `id=value;...`, pairs ordered by id
pub fn encode_line(record: &Record, dictionary: &FieldDictionary) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_line_into(record, dictionary, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the encoded record to `buf`
///
/// On error `buf` is left untouched.
pub fn encode_line_into(
    record: &Record,
    dictionary: &FieldDictionary,
    buf: &mut BytesMut,
) -> Result<(), EncodeError> {
    let mut pairs = Vec::with_capacity(record.len());
    for (name, value) in record.iter() {
        let id = dictionary
            .id(name)
            .ok_or_else(|| EncodeError::UnknownField(name.to_string()))?;
        if let Some(byte) = value
            .bytes()
            .find(|b| *b == FIELD_SEPARATOR || *b == LINE_SEPARATOR)
        {
            return Err(EncodeError::ReservedByte {
                field: name.to_string(),
                byte: byte as char,
            });
        }
        pairs.push((id, value));
    }
    pairs.sort_unstable_by_key(|(id, _)| *id);

    for (i, (id, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            buf.put_u8(FIELD_SEPARATOR);
        }
        buf.put_slice(id.to_string().as_bytes());
        buf.put_u8(KEY_VALUE_SEPARATOR);
        buf.put_slice(value.as_bytes());
    }

    Ok(())
}

/// Decode `id=value;...` into a record, skipping anything unrecognised
pub fn decode_line(line: &[u8], dictionary: &FieldDictionary) -> Record {
    let mut record = Record::new();

    for pair in line.split(|b| *b == FIELD_SEPARATOR) {
        let Some(eq) = pair.iter().position(|b| *b == KEY_VALUE_SEPARATOR) else {
            continue;
        };
        let (key, value) = (&pair[..eq], &pair[eq + 1..]);

        let Some(id) = std::str::from_utf8(key)
            .ok()
            .and_then(|k| k.parse::<u16>().ok())
        else {
            continue;
        };
        let Some(name) = dictionary.name(id) else {
            continue;
        };

        record.insert(name, String::from_utf8_lossy(value));
    }

    record
}

/// Decode a newline-separated batch payload, skipping blank lines
pub fn decode_lines(payload: &[u8], dictionary: &FieldDictionary) -> Vec<Record> {
    payload
        .split(|b| *b == LINE_SEPARATOR)
        .filter(|line| !line.is_empty())
        .map(|line| decode_line(line, dictionary))
        .collect()
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
