//! Cassandra Compaction CLI
//!
//! Compacts SSTables through the Cassandra retention filter.

use std::path::PathBuf;

use clap::Parser;
use cassandra_compaction::storage::SSTableReader;
use cassandra_compaction::{CassandraCompactionFilter, CompactionJob, FilterConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Cassandra compaction
#[derive(Parser, Debug)]
#[command(name = "cassandra-compact")]
#[command(about = "Compact wide-row SSTables, dropping expired and deleted data")]
#[command(version)]
struct Args {
    /// Input SSTables, newest first
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output SSTable path
    #[arg(short, long)]
    output: PathBuf,

    /// Output level reported to the filter
    #[arg(short, long, default_value = "1")]
    level: u32,

    /// Purge expired TTL cells instead of converting them to tombstones
    #[arg(long)]
    purge_ttl_on_expiration: bool,

    /// Drop range/partition-deleted rows without waiting for gc grace
    #[arg(long)]
    ignore_range_delete_on_read: bool,

    /// Tombstone gc grace period in seconds
    #[arg(short, long, default_value = "864000")]
    gc_grace_seconds: i32,

    /// Fixed partition key length (0 = length-prefixed)
    #[arg(short, long, default_value = "0")]
    partition_key_length: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cassandra_compaction=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("cassandra-compact v{}", cassandra_compaction::VERSION);
    tracing::info!("Inputs: {:?}", args.inputs);
    tracing::info!("Output: {}", args.output.display());

    let config = FilterConfig::builder()
        .purge_ttl_on_expiration(args.purge_ttl_on_expiration)
        .ignore_range_delete_on_read(args.ignore_range_delete_on_read)
        .gc_grace_period_in_seconds(args.gc_grace_seconds)
        .partition_key_length(args.partition_key_length)
        .build();

    let compaction_filter = match CassandraCompactionFilter::new(config) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Invalid filter configuration: {}", e);
            std::process::exit(2);
        }
    };

    let mut readers = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        match SSTableReader::open(path) {
            Ok(reader) => readers.push(reader),
            Err(e) => {
                tracing::error!("Failed to open {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    let job = CompactionJob::new(&compaction_filter, args.level);
    match job.run(&mut readers, &args.output) {
        Ok(output) => match output.sstable {
            Some(sstable) => tracing::info!(
                "Wrote {} entries ({} bytes) to {}",
                sstable.entry_count,
                sstable.file_size,
                sstable.path.display()
            ),
            None => tracing::info!("Every entry was dropped; no output written"),
        },
        Err(e) => {
            tracing::error!("Compaction failed: {}", e);
            std::process::exit(1);
        }
    }
}
