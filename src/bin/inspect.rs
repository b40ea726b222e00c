//! diskhash Inspection Tool
//!
//! Prints the header, statistics or a structural check of a table on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use diskhash::{Options, Table};
use tracing_subscriber::{fmt, EnvFilter};

/// diskhash inspector
#[derive(Parser, Debug)]
#[command(name = "diskhash-inspect")]
#[command(about = "Inspect diskhash table files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the table header without opening the table
    Header {
        /// Table directory
        dir: PathBuf,
    },

    /// Open the table and print its statistics
    Stats {
        /// Table directory
        dir: PathBuf,
    },

    /// Walk every bucket chain and report structural problems
    Verify {
        /// Table directory
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,diskhash=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> diskhash::Result<()> {
    match command {
        Commands::Header { dir } => {
            let header = Table::read_header(&dir)?;
            let layout = header.layout;

            println!("value_len:        {}", layout.value_len());
            println!("slot_capacity:    {}", layout.slot_capacity());
            println!("block_size:       {}", layout.block_size());
            println!("bucket_count:     {}", header.bucket_count);
            println!("hasher_id:        {}", header.hasher_id);
            println!("entry_count:      {}", header.entry_count);
            println!("clean:            {}", header.clean);
        }
        Commands::Stats { dir } => {
            let table = open_existing(&dir)?;
            let stats = table.stats()?;

            println!("entries:          {}", stats.entries);
            println!("bucket_count:     {}", stats.bucket_count);
            println!("overflow_buckets: {}", stats.overflow_buckets);
            println!("slot_capacity:    {}", stats.slot_capacity);
            println!("value_len:        {}", stats.value_len);
            println!("file_size:        {}", stats.file_size);

            table.close()?;
        }
        Commands::Verify { dir } => {
            let table = open_existing(&dir)?;
            let report = table.verify()?;

            println!("chains:           {}", report.chains);
            println!("entries:          {}", report.entries);
            println!("overflow_buckets: {}", report.overflow_buckets);
            println!("orphaned_buckets: {}", report.orphaned_buckets);
            println!("longest_chain:    {}", report.longest_chain);

            if report.orphaned_buckets > 0 {
                tracing::warn!(
                    orphaned = report.orphaned_buckets,
                    "Table holds overflow buckets no chain links to"
                );
            }

            table.close()?;
        }
    }

    Ok(())
}

/// Open a table read-only using the geometry recorded in its header
fn open_existing(dir: &Path) -> diskhash::Result<Table> {
    let header = Table::read_header(dir)?;
    let options = Options::builder()
        .dir_path(dir)
        .value_len(header.layout.value_len())
        .read_only(true)
        .build();
    Table::open(options)
}
