//! Result collection
//!
//! Reads result frames from the gateway and appends each query's rows to
//! `<output>/<query>.csv`. A query that fails upstream leaves no file behind.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use analyzer_protocol::{EnvelopeKind, RESULT_LENGTH_SIZE, decode_result_frame, result_rows};

use crate::error::{ClientError, Result};

/// Largest result frame accepted by default
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// How each expected query ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSummary {
    pub completed: Vec<u8>,
    pub failed: Vec<u8>,
    pub rows: u64,
}

struct QueryFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Read side of a client connection
#[derive(Debug, Clone)]
pub struct ResultCollector {
    output: PathBuf,
    queries: Vec<u8>,
    max_frame_size: usize,
}

impl ResultCollector {
    pub fn new(output: impl Into<PathBuf>, queries: Vec<u8>) -> Self {
        Self {
            output: output.into(),
            queries,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Reject result frames announcing more than `max` bytes
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// File a query's rows are written to
    pub fn query_path(&self, query: u8) -> PathBuf {
        self.output.join(format!("{query}.csv"))
    }

    /// Receive until every expected query reported EOF or ERROR
    pub async fn run<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<ResultSummary> {
        tokio::fs::create_dir_all(&self.output)
            .await
            .map_err(|e| ClientError::file(&self.output, e))?;

        let mut open = BTreeMap::new();
        for &query in &self.queries {
            let path = self.query_path(query);
            let file = File::create(&path)
                .await
                .map_err(|e| ClientError::file(&path, e))?;
            open.insert(
                query,
                QueryFile {
                    path,
                    writer: BufWriter::new(file),
                },
            );
        }

        let mut summary = ResultSummary::default();
        while !open.is_empty() {
            let frame = read_frame(reader, self.max_frame_size)
                .await
                .map_err(|e| match e {
                    FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        ClientError::Disconnected {
                            pending: open.len(),
                        }
                    }
                    FrameError::Io(e) => ClientError::Receive(e),
                    FrameError::TooLarge(size) => ClientError::FrameTooLarge {
                        size,
                        max: self.max_frame_size,
                    },
                })?;
            let envelope = decode_result_frame(frame)?;
            let query = envelope.query;

            let Some(file) = open.get_mut(&query) else {
                warn!(query, kind = envelope.kind.as_str(), "result for an unexpected query");
                continue;
            };

            match envelope.kind {
                EnvelopeKind::Batch => {
                    let mut rows = 0u64;
                    for row in result_rows(&envelope.payload) {
                        write_row(file, row).await?;
                        rows += 1;
                    }
                    summary.rows += rows;
                    debug!(query, rows, "result rows received");
                }
                EnvelopeKind::Eof => {
                    if let Some(mut file) = open.remove(&query) {
                        file.writer
                            .flush()
                            .await
                            .map_err(|e| ClientError::file(&file.path, e))?;
                        info!(query, path = %file.path.display(), "query results ready");
                    }
                    summary.completed.push(query);
                }
                EnvelopeKind::Error => {
                    if let Some(file) = open.remove(&query) {
                        drop(file.writer);
                        if let Err(e) = tokio::fs::remove_file(&file.path).await {
                            debug!(path = %file.path.display(), error = %e, "could not remove partial result");
                        }
                    }
                    warn!(query, "query failed");
                    summary.failed.push(query);
                }
            }
        }

        Ok(summary)
    }
}

enum FrameError {
    Io(io::Error),
    TooLarge(usize),
}

/// Read one result frame, length prefix included
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> std::result::Result<Bytes, FrameError> {
    let mut prefix = [0u8; RESULT_LENGTH_SIZE];
    reader.read_exact(&mut prefix).await.map_err(FrameError::Io)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(FrameError::TooLarge(len));
    }

    let mut frame = BytesMut::zeroed(RESULT_LENGTH_SIZE + len);
    frame[..RESULT_LENGTH_SIZE].copy_from_slice(&prefix);
    reader
        .read_exact(&mut frame[RESULT_LENGTH_SIZE..])
        .await
        .map_err(FrameError::Io)?;
    Ok(frame.freeze())
}

async fn write_row(file: &mut QueryFile, row: &[u8]) -> Result<()> {
    let path: &Path = &file.path;
    file.writer
        .write_all(row)
        .await
        .map_err(|e| ClientError::file(path, e))?;
    file.writer
        .write_all(b"\n")
        .await
        .map_err(|e| ClientError::file(path, e))
}
