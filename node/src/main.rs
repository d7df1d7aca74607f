//! MPTD Node Binary

use clap::{Parser, Subcommand};
use mptd_core::{NodeConfig, StorageBackend};
use mptd_node::NodeBuilder;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mptd")]
#[command(about = "MPTD - Remote Merkle Patricia Trie sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        listen_addr: Option<String>,

        /// Node database backend (memory or sled)
        #[arg(long, value_parser = parse_backend)]
        storage: Option<StorageBackend>,

        /// Data directory for the sled backend
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Log level, overridden by RUST_LOG
        #[arg(long)]
        log_level: Option<String>,

        /// Allow cross-origin requests
        #[arg(long)]
        cors: bool,
    },

    /// Print the default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_backend(s: &str) -> Result<StorageBackend, String> {
    match s.to_ascii_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "sled" => Ok(StorageBackend::Sled),
        other => Err(format!("unknown storage backend '{}'", other)),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            listen_addr,
            storage,
            data_dir,
            log_level,
            cors,
        } => {
            let mut node_config = match config {
                Some(path) => NodeConfig::from_file(&path)?,
                None => NodeConfig::default(),
            };
            if let Some(level) = log_level {
                node_config.log_level = level;
            }
            init_logging(&node_config.log_level);

            let mut builder = NodeBuilder::new().config(node_config);
            if let Some(addr) = listen_addr {
                builder = builder.api_addr(&addr);
            }
            if let Some(backend) = storage {
                builder = builder.storage(backend);
            }
            if let Some(dir) = data_dir {
                builder = builder.data_dir(dir);
            }
            if cors {
                builder = builder.cors(true);
            }

            let node = builder.build()?;
            info!(
                "Listening on {}",
                node.runtime().config().api.listen_addr
            );

            node.start().await?;
        }

        Commands::Config { output } => {
            let json = NodeConfig::default().to_json()?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json)?;
                    println!("Configuration saved to: {}", path.display());
                }
                None => {
                    println!("{}", json);
                }
            }
        }
    }

    Ok(())
}
