//! Quote-aware CSV row reader
//!
//! Yields one row per record, not per line: a quoted field may contain
//! commas, doubled quotes and line breaks. Blank lines are skipped.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{ClientError, Result};

/// One CSV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// Line the record starts on, 1-based
    pub line: u64,
    /// Record text without its line terminator
    pub text: String,
    /// Unquoted field values
    pub fields: Vec<String>,
}

/// Streaming reader over CSV text
#[derive(Debug)]
pub struct CsvReader<R> {
    inner: R,
    path: PathBuf,
    line: u64,
}

impl<R: AsyncBufRead + Unpin> CsvReader<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            line: 0,
        }
    }

    /// Next non-blank record, `None` at end of input
    pub async fn next_row(&mut self) -> Result<Option<CsvRow>> {
        loop {
            let start = self.line + 1;
            let mut text = String::new();
            let mut quotes = 0usize;

            loop {
                let before = text.len();
                let n = self
                    .inner
                    .read_line(&mut text)
                    .await
                    .map_err(|e| ClientError::file(&self.path, e))?;
                if n == 0 {
                    if quotes % 2 == 1 {
                        return Err(ClientError::UnterminatedQuote {
                            path: self.path.clone(),
                            line: start,
                        });
                    }
                    break;
                }
                self.line += 1;
                quotes += text[before..].matches('"').count();
                if quotes % 2 == 0 {
                    break;
                }
            }

            if text.is_empty() {
                return Ok(None);
            }
            trim_terminator(&mut text);
            if text.is_empty() {
                continue;
            }

            let fields = split_fields(&text);
            return Ok(Some(CsvRow {
                line: start,
                text,
                fields,
            }));
        }
    }
}

fn trim_terminator(text: &mut String) {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
}

/// Split one record into field values, resolving quoting
pub fn split_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
