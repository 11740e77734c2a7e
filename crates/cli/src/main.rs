//! shardsync: directory synchronization over sharded block storage
//!
//! Files are split into fixed-size blocks, deduplicated by SHA-256, and
//! spread across block servers by consistent hashing; a metadata server
//! arbitrates per-file versions. Last writer wins; the loser adopts the
//! winner's content on its next sync.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand, builder::Styles};
use color_eyre::Result;
use tracing::info;

use shardsync_client::{RemoteMetaStore, SyncOptions, TcpConnector, sync_cycle};
use shardsync_core::{SyncConfig, index};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "shardsync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Sync a directory against sharded block servers")]
#[command(long_about = r#"
shardsync keeps a flat directory in step with a logical remote directory.

Each file is chunked into fixed-size blocks addressed by their SHA-256 and
sharded across block servers; a metadata server tracks per-file versions.
Conflicting writers converge on the last accepted version.

Examples:
  shardsync sync ./data --meta 10.0.0.5:9000        One reconciliation pass
  shardsync sync ./data --meta host:9000 -b 65536   Custom block size
  shardsync status ./data                           Show the local index
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle against the metadata server
    Sync {
        /// Directory to synchronize
        dir: PathBuf,

        /// Metadata server address (host:port)
        #[arg(short, long)]
        meta: String,

        /// Block size in bytes (default 4096, or block_size from .shardsync.toml)
        #[arg(short, long)]
        block_size: Option<u32>,

        /// Per-call RPC timeout in milliseconds (default 1000)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Print the local index without contacting any server
    Status {
        /// Directory whose index to print
        dir: PathBuf,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        format: String,
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
        Commands::Sync {
            dir,
            meta,
            block_size,
            timeout_ms,
        } => sync_command(dir, &meta, block_size, timeout_ms),
        Commands::Status { dir, format } => status_command(&dir, &format),
    }
}

fn sync_command(
    dir: PathBuf,
    meta_addr: &str,
    block_size: Option<u32>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let config = SyncConfig::load(&dir)?;
    let block_size = config.block_size(block_size) as usize;
    let timeout = Duration::from_millis(config.timeout_ms(timeout_ms));

    info!(
        "syncing {} against {meta_addr} (block size {block_size})",
        dir.display()
    );

    let mut meta = RemoteMetaStore::connect(meta_addr, timeout)?;
    let connector = TcpConnector { timeout };
    let opts = SyncOptions {
        base_dir: dir,
        block_size,
    };

    let report = sync_cycle(&opts, &mut meta, &connector)?;
    if report.is_noop() {
        eprintln!("Already in sync");
    } else {
        eprintln!(
            "Synced: {} pushed, {} pulled, {} removed, {} skipped",
            report.pushed, report.pulled, report.removed, report.skipped
        );
    }
    Ok(())
}

fn status_command(dir: &PathBuf, format: &str) -> Result<()> {
    let local_index = index::load(dir)?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&local_index)?;
            eprintln!("{json}");
        }
        _ => {
            if local_index.is_empty() {
                eprintln!("No index at {}", dir.display());
                return Ok(());
            }
            let mut names: Vec<&String> = local_index.keys().collect();
            names.sort_unstable();
            eprintln!("Files: {}", names.len());
            for name in names {
                let meta = &local_index[name];
                if meta.manifest.is_deleted() {
                    eprintln!("  {name} v{} (deleted)", meta.version);
                } else {
                    let blocks = meta.manifest.to_wire().len();
                    eprintln!("  {name} v{} ({blocks} blocks)", meta.version);
                }
            }
        }
    }
    Ok(())
}
