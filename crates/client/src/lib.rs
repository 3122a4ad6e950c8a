//! Analyzer Client Library
//!
//! Uploads the movies, credits and ratings CSV files to a gateway and
//! collects the per-query results it streams back on the same connection.
//!
//! - [`csv`] - quote-aware row reader
//! - [`batch`] - packing rows into `BATCH` messages under a byte budget
//! - [`upload`] - resource framing and row encoding
//! - [`results`] - result frames to `<output>/<query>.csv`
//!
//! # Example
//!
//! ```ignore
//! use analyzer_client::{Client, ClientOptions};
//!
//! let client = Client::connect("127.0.0.1:9090", ClientOptions::default()).await?;
//! let session = client.run("data".as_ref(), "results".as_ref()).await?;
//! println!("{} rows received", session.results.rows);
//! ```

mod error;

pub mod batch;
pub mod csv;
pub mod results;
pub mod upload;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;

use analyzer_protocol::{FieldDictionary, known_queries};

pub use error::{ClientError, Result};
pub use results::{DEFAULT_MAX_FRAME_SIZE, ResultCollector, ResultSummary};
pub use upload::{FileSummary, RowFormat, Uploader};

/// Default batch budget in bytes
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// Upload and collection settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub batch_size: usize,
    pub format: RowFormat,
    /// Queries to wait for
    pub queries: Vec<u8>,
    pub dictionary: Arc<FieldDictionary>,
    /// Largest result frame accepted from the gateway
    pub max_frame_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            format: RowFormat::default(),
            queries: known_queries().collect(),
            dictionary: Arc::new(FieldDictionary::standard()),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// What one session sent and received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub upload: FileSummary,
    pub results: ResultSummary,
}

/// Connection to a gateway
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    options: ClientOptions,
}

impl Client {
    /// Connect to a gateway
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established.
    pub async fn connect(address: &str, options: ClientOptions) -> Result<Self> {
        let connect_err = |source| ClientError::Connect {
            address: address.to_string(),
            source,
        };
        let stream = TcpStream::connect(address).await.map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;
        Ok(Self { stream, options })
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Upload `data_dir` while results are written under `output`
    ///
    /// Both directions run concurrently; results can arrive before the last
    /// file is sent.
    pub async fn run(self, data_dir: &Path, output: &Path) -> Result<Session> {
        let (mut read, write) = self.stream.into_split();
        let mut uploader = Uploader::new(
            write,
            self.options.dictionary,
            self.options.batch_size,
            self.options.format,
        );
        let collector = ResultCollector::new(output, self.options.queries)
            .with_max_frame_size(self.options.max_frame_size);

        let (uploaded, collected) =
            tokio::join!(uploader.upload_dir(data_dir), collector.run(&mut read));

        Ok(Session {
            upload: uploaded?,
            results: collected?,
        })
    }
}
