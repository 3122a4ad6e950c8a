//! Resource upload
//!
//! Each resource is sent as its identifier byte, the file's rows packed into
//! `BATCH` messages, and a closing `FIN`. The header row names the columns;
//! in record mode it maps them onto the field dictionary and columns the
//! dictionary does not know are left out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use analyzer_protocol::{FieldDictionary, Message, Record, Resource, encode_line};

use crate::batch::BatchPacker;
use crate::csv::{CsvReader, CsvRow};
use crate::error::{ClientError, Result};

/// How CSV rows are put on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowFormat {
    /// `id=value;...` records keyed by the header row
    #[default]
    Record,
    /// The CSV text of the row, unchanged
    Raw,
}

/// Counts for one uploaded file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub rows: u64,
    pub skipped: u64,
    pub batches: u64,
}

/// Path of a resource's file inside the data directory
pub fn resource_path(dir: &Path, resource: Resource) -> PathBuf {
    dir.join(format!("{resource}.csv"))
}

/// Write side of a client connection
#[derive(Debug)]
pub struct Uploader<W> {
    writer: W,
    dictionary: Arc<FieldDictionary>,
    batch_size: usize,
    format: RowFormat,
}

impl<W: AsyncWrite + Unpin> Uploader<W> {
    pub fn new(
        writer: W,
        dictionary: Arc<FieldDictionary>,
        batch_size: usize,
        format: RowFormat,
    ) -> Self {
        Self {
            writer,
            dictionary,
            batch_size,
            format,
        }
    }

    /// Upload every resource of `dir` in resource order
    pub async fn upload_dir(&mut self, dir: &Path) -> Result<FileSummary> {
        let mut total = FileSummary::default();
        for resource in Resource::ALL {
            let file = self.upload_file(resource, &resource_path(dir, resource)).await?;
            total.rows += file.rows;
            total.skipped += file.skipped;
            total.batches += file.batches;
        }
        info!(rows = total.rows, batches = total.batches, "upload complete");
        Ok(total)
    }

    /// Upload one file as `resource`
    ///
    /// On failure the gateway is sent `ERROR` for the resource before the
    /// error is returned.
    pub async fn upload_file(&mut self, resource: Resource, path: &Path) -> Result<FileSummary> {
        self.write(resource, &[resource.to_u8()]).await?;

        match self.send_rows(resource, path).await {
            Ok(summary) => {
                self.write(resource, &Message::Fin.encode()).await?;
                info!(
                    resource = %resource,
                    rows = summary.rows,
                    skipped = summary.skipped,
                    batches = summary.batches,
                    "file sent"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(resource = %resource, error = %e, "upload failed");
                if let Err(send) = self.write(resource, &Message::Error.encode()).await {
                    debug!(resource = %resource, error = %send, "could not report failure");
                }
                Err(e)
            }
        }
    }

    async fn send_rows(&mut self, resource: Resource, path: &Path) -> Result<FileSummary> {
        let file = File::open(path)
            .await
            .map_err(|e| ClientError::file(path, e))?;
        let mut reader = CsvReader::new(BufReader::new(file), path);

        let header = reader
            .next_row()
            .await?
            .ok_or_else(|| ClientError::MissingHeader {
                path: path.to_path_buf(),
            })?;
        let columns = self.columns(&header);

        let mut packer = BatchPacker::new(self.batch_size);
        let mut summary = FileSummary::default();

        while let Some(row) = reader.next_row().await? {
            if row.fields.len() != header.fields.len() {
                debug!(
                    resource = %resource,
                    line = row.line,
                    fields = row.fields.len(),
                    expected = header.fields.len(),
                    "skipping row with wrong field count"
                );
                summary.skipped += 1;
                continue;
            }

            let Some(line) = self.line(&columns, row)? else {
                summary.skipped += 1;
                continue;
            };
            summary.rows += 1;

            if let Some(batch) = packer.push(line)? {
                self.write(resource, &batch.encode()).await?;
                summary.batches += 1;
            }
        }

        if let Some(batch) = packer.take() {
            self.write(resource, &batch.encode()).await?;
            summary.batches += 1;
        }
        Ok(summary)
    }

    /// Header names the dictionary knows, by column position
    fn columns(&self, header: &CsvRow) -> Vec<Option<String>> {
        header
            .fields
            .iter()
            .map(|name| {
                let name = name.trim();
                self.dictionary.contains(name).then(|| name.to_string())
            })
            .collect()
    }

    /// Wire line for a row; `None` when nothing of it would be sent
    fn line(&self, columns: &[Option<String>], row: CsvRow) -> Result<Option<Bytes>> {
        match self.format {
            RowFormat::Raw => Ok(Some(Bytes::from(row.text))),
            RowFormat::Record => {
                let record: Record = columns
                    .iter()
                    .zip(row.fields)
                    .filter_map(|(column, value)| {
                        let column = column.as_deref()?;
                        Some((column, value.replace([';', '\n'], " ")))
                    })
                    .collect();

                if record.is_empty() {
                    return Ok(None);
                }
                Ok(Some(encode_line(&record, &self.dictionary)?))
            }
        }
    }

    async fn write(&mut self, resource: Resource, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|source| ClientError::Send { resource, source })?;
        self.writer
            .flush()
            .await
            .map_err(|source| ClientError::Send { resource, source })
    }

    /// Give back the write half
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
