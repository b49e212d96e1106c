//! Command-line front end for the oc-mirror replication engine.
//!
//! Serves a source directory through the in-process store and pulls it onto
//! the destination path with the full engine: concurrent discovery, block
//! verification, hardlink preservation, and bottom-up finalization.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use engine::{
    DEFAULT_BLOCK_SIZE, DEFAULT_PARALLEL_DIR, DEFAULT_PARALLEL_FILE, SyncOptions, Syncer,
};
use protocol::DirStore;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// One-way file-tree replicator.
#[derive(Parser, Debug)]
#[command(name = "oc-mirror")]
#[command(about = "Replicates a source directory tree onto a destination path")]
#[command(version)]
struct Cli {
    /// Source directory to replicate from.
    #[arg(long)]
    source: PathBuf,

    /// Destination directory to replicate into.
    #[arg(long)]
    dest: PathBuf,

    /// Remove destination entries that have no source counterpart.
    #[arg(long)]
    delete: bool,

    /// Verify content block-by-block even when metadata matches.
    #[arg(long)]
    always_checksum: bool,

    /// Include ACLs in comparison and application.
    #[arg(long)]
    acls: bool,

    /// Do not recreate hardlink groups on the destination.
    #[arg(long)]
    no_hardlinks: bool,

    /// Number of concurrent file workers.
    #[arg(long, default_value_t = DEFAULT_PARALLEL_FILE)]
    parallel_file: usize,

    /// Number of concurrent directory workers.
    #[arg(long, default_value_t = DEFAULT_PARALLEL_DIR)]
    parallel_dir: usize,

    /// Block size in bytes for checksum comparison and transfer.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = SyncOptions::new(&cli.dest)
        .with_delete(cli.delete)
        .with_always_checksum(cli.always_checksum)
        .with_acls(cli.acls)
        .with_preserve_hardlinks(!cli.no_hardlinks)
        .with_parallel_file(cli.parallel_file)
        .with_parallel_dir(cli.parallel_dir)
        .with_block_size(cli.block_size);

    let store = Arc::new(DirStore::new(&cli.source));
    match Syncer::new(store, options).run() {
        Ok(summary) => {
            println!(
                "{} files ({} bytes) processed, {} directories listed, {} entries deleted, {} bytes written",
                summary.files_processed,
                summary.bytes_processed,
                summary.directories_processed,
                summary.entries_deleted,
                summary.written_bytes,
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("replication failed: {err}");
            ExitCode::FAILURE
        }
    }
}
