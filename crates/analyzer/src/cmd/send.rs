//! Send command - upload a data directory and collect results

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::{info, warn};

use analyzer_client::{Client, ClientOptions, DEFAULT_BATCH_SIZE, RowFormat};
use analyzer_protocol::{FieldDictionary, query_columns};

/// Send command arguments
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Gateway address
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    pub addr: String,

    /// Directory holding movies.csv, credits.csv and ratings.csv
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory result files are written to
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,

    /// Maximum encoded size of one batch in bytes
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Queries to wait for, comma separated
    #[arg(short, long, value_delimiter = ',', default_values_t = [1u8, 2, 3, 4, 5])]
    pub queries: Vec<u8>,

    /// Send rows as they appear in the file instead of `id=value` records
    #[arg(long)]
    pub raw: bool,
}

/// Run the send command
pub async fn run(args: SendArgs) -> Result<()> {
    if let Some(query) = args.queries.iter().find(|&&q| query_columns(q).is_none()) {
        bail!("unknown query {query}");
    }

    let options = ClientOptions {
        batch_size: args.batch_size,
        format: if args.raw { RowFormat::Raw } else { RowFormat::Record },
        queries: args.queries,
        dictionary: Arc::new(FieldDictionary::standard()),
        ..ClientOptions::default()
    };

    let client = Client::connect(&args.addr, options).await?;
    info!(addr = %args.addr, data_dir = %args.data_dir.display(), "connected to gateway");

    let session = client
        .run(&args.data_dir, &args.output)
        .await
        .context("session failed")?;

    info!(
        rows = session.upload.rows,
        skipped = session.upload.skipped,
        batches = session.upload.batches,
        "upload complete"
    );
    info!(
        completed = ?session.results.completed,
        rows = session.results.rows,
        output = %args.output.display(),
        "results received"
    );

    if !session.results.failed.is_empty() {
        warn!(failed = ?session.results.failed, "some queries failed");
        bail!("queries failed: {:?}", session.results.failed);
    }
    Ok(())
}
