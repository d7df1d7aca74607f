//! MPTD CLI - Command Line Interface

use clap::{Parser, Subcommand};
use colored::Colorize;
use mptd_cli::{ApiClient, TrieClient};
use mptd_core::{ClientConfig, Root, SessionId, TrieError, TrieResult};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpt")]
#[command(about = "MPT - client for remote Merkle Patricia Trie sessions")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, default_value = "http://localhost:50051")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Treat keys and values as hex instead of UTF-8
    #[arg(long, global = true)]
    hex: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new session
    Init,

    /// Server status
    Status,

    /// Print a session's current root
    Root { id: u64 },

    /// Read a key
    Get {
        id: u64,
        key: String,

        /// Root to read at (defaults to the session's root)
        #[arg(short, long)]
        root: Option<String>,

        /// Read node storage directly
        #[arg(long)]
        raw: bool,
    },

    /// Write a key
    Put {
        id: u64,
        key: String,
        value: String,

        #[arg(short, long)]
        root: Option<String>,

        /// Write node storage directly
        #[arg(long)]
        raw: bool,
    },

    /// Delete a key
    Del {
        id: u64,
        key: String,

        #[arg(short, long)]
        root: Option<String>,
    },

    /// Check that a root is present in the session's storage
    CheckRoot { id: u64, root: String },

    /// Stream every entry of a session
    Dump {
        id: u64,

        #[arg(short, long)]
        root: Option<String>,
    },

    /// Fork a session
    Copy { id: u64 },

    /// Begin a checkpoint
    Checkpoint { id: u64 },

    /// Commit the innermost checkpoint
    Commit { id: u64 },

    /// Revert the innermost checkpoint
    Revert { id: u64 },

    /// Is the session inside a checkpoint
    InCheckpoint { id: u64 },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> TrieResult<()> {
    let config = ClientConfig {
        server_url: cli.server,
        timeout_secs: cli.timeout,
    };
    let api = Arc::new(ApiClient::from_config(&config)?);
    let hex_mode = cli.hex;

    match cli.command {
        Commands::Init => {
            let view = TrieClient::initialize(api).await?;
            println!("{} session {}", "✓".green(), view.id());
            println!("Root: {}", view.root().await?);
        }

        Commands::Status => {
            let status = api.status().await?;
            println!("MPTD Node Status");
            println!("================");
            println!("Name:     {}", status.name);
            println!("Sessions: {}", status.sessions);
            if !status.session_ids.is_empty() {
                let ids: Vec<String> = status.session_ids.iter().map(|id| id.to_string()).collect();
                println!("Ids:      {}", ids.join(", "));
            }
            println!("Storage:  {}", status.storage);
        }

        Commands::Root { id } => {
            println!("{}", api.get_root(SessionId::new(id)).await?);
        }

        Commands::Get { id, key, root, raw } => {
            let view = open_view(api, id, root)?;
            let key = parse_bytes(&key, hex_mode)?;
            let value = if raw {
                view.get_raw(&key).await?
            } else {
                view.get(&key).await?
            };

            match value {
                Some(value) => println!("{}", show_bytes(&value, hex_mode)),
                None => println!("{}", "(not found)".yellow()),
            }
        }

        Commands::Put {
            id,
            key,
            value,
            root,
            raw,
        } => {
            let view = open_view(api, id, root)?;
            let key = parse_bytes(&key, hex_mode)?;
            let value = parse_bytes(&value, hex_mode)?;

            let previous = if raw {
                view.put_raw(&key, &value).await?
            } else {
                view.put(&key, &value).await?
            };

            println!("{} stored", "✓".green());
            if let Some(previous) = previous {
                println!("Previous: {}", show_bytes(&previous, hex_mode));
            }
            if !raw {
                println!("New root: {}", view.root().await?);
            }
        }

        Commands::Del { id, key, root } => {
            let view = open_view(api, id, root)?;
            let key = parse_bytes(&key, hex_mode)?;

            match view.del(&key).await? {
                Some(previous) => println!("{} deleted {}", "✓".green(), show_bytes(&previous, hex_mode)),
                None => println!("{}", "(not found)".yellow()),
            }
            println!("New root: {}", view.root().await?);
        }

        Commands::CheckRoot { id, root } => {
            let root = Root::from_hex(&root)?;
            let valid = api.check_root(SessionId::new(id), root).await?;
            if valid {
                println!("{} {} is valid", "✓".green(), root);
            } else {
                println!("{} {} is not present", "✗".red(), root);
            }
        }

        Commands::Dump { id, root } => {
            let view = open_view(api, id, root)?;
            let mut stream = view.read_stream().await?;
            let mut count = 0usize;

            while let Some(entry) = stream.next().await {
                let entry = entry?;
                println!(
                    "{}  {}",
                    hex::encode(&entry.key).dimmed(),
                    show_bytes(&entry.value, hex_mode)
                );
                count += 1;
            }
            println!("{} entries", count);
        }

        Commands::Copy { id } => {
            let source = TrieClient::attach(api, SessionId::new(id));
            let copy = source.copy().await?;
            println!("{} session {}", "✓".green(), copy.id());
            println!("Root: {}", copy.root().await?);
        }

        Commands::Checkpoint { id } => {
            let report = api.checkpoint(SessionId::new(id)).await?;
            println!("Depth: {}", report.depth);
        }

        Commands::Commit { id } => {
            let report = api.commit(SessionId::new(id)).await?;
            println!("Depth: {}", report.depth);
            println!("Root:  {}", report.root);
        }

        Commands::Revert { id } => {
            let report = api.revert(SessionId::new(id)).await?;
            println!("Depth: {}", report.depth);
            println!("Root:  {}", report.root);
        }

        Commands::InCheckpoint { id } => {
            let result = api.in_checkpoint(SessionId::new(id)).await?;
            println!("{}", if result { "yes" } else { "no" });
        }
    }

    Ok(())
}

fn open_view(api: Arc<ApiClient>, id: u64, root: Option<String>) -> TrieResult<TrieClient> {
    let id = SessionId::new(id);
    Ok(match root {
        Some(root) => TrieClient::with_root(api, id, Root::from_hex(&root)?),
        None => TrieClient::attach(api, id),
    })
}

fn parse_bytes(input: &str, hex_mode: bool) -> TrieResult<Vec<u8>> {
    if hex_mode {
        hex::decode(input.trim_start_matches("0x"))
            .map_err(|e| TrieError::InvalidRequest(format!("{}: {}", input, e)))
    } else {
        Ok(input.as_bytes().to_vec())
    }
}

fn show_bytes(bytes: &[u8], hex_mode: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !hex_mode => text.to_string(),
        _ => hex::encode(bytes),
    }
}
