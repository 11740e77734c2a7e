//! shardsync-server: block and metadata server binary
//!
//! `shardsync-server block` runs one content-addressed block shard;
//! `shardsync-server meta` runs the metadata server over a configured set
//! of block shards. Startup failures (bad address, cannot listen) are fatal.

use std::net::TcpListener;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use shardsync_core::{BlockStore, MetaStore};
use shardsync_server::{serve_block_store, serve_meta_store};

#[derive(Parser)]
#[command(name = "shardsync-server")]
#[command(version)]
#[command(about = "Block and metadata servers for shardsync")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block server (one shard of the content-addressed store)
    Block {
        /// Address to listen on, e.g. 127.0.0.1:9001
        #[arg(short, long)]
        listen: String,
    },

    /// Run the metadata server
    Meta {
        /// Address to listen on, e.g. 127.0.0.1:9000
        #[arg(short, long)]
        listen: String,

        /// Block server address; repeat once per shard
        #[arg(long = "block-addr", required = true)]
        block_addrs: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Block { listen } => {
            let listener = TcpListener::bind(&listen)?;
            serve_block_store(listener, Arc::new(BlockStore::new()))
        }
        Commands::Meta {
            listen,
            block_addrs,
        } => {
            let listener = TcpListener::bind(&listen)?;
            serve_meta_store(listener, Arc::new(MetaStore::new(block_addrs)))
        }
    }
}
