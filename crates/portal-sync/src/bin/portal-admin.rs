//! portal-admin CLI tool
//!
//! Inspects and maintains the local portal-sync store.
//!
//! Usage:
//!   portal-admin keys
//!   portal-admin get <key> [identity]
//!   portal-admin set <key> <identity> <json>
//!   portal-admin meta [identity]
//!   portal-admin migrate <legacy_key> <new_key>
//!   portal-admin chunk-put <content>
//!   portal-admin chunk-get <address>
//!   portal-admin peers
//!   portal-admin set-peers <csv>

use portal_sync::{
    migrate, parse_peers, scope, set_peers_config, Error, Identity, LogicalKey, MemoryOverlay,
    Result, SyncConfig, SyncStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum Command {
    Keys,
    Get { key: String, identity: Identity },
    Set { key: String, identity: Identity, json: String },
    Meta { identity: Identity },
    Migrate { legacy_key: String, new_key: String },
    ChunkPut { content: String },
    ChunkGet { address: String },
    Peers,
    SetPeers { csv: String },
}

fn print_usage() {
    eprintln!("portal-admin - Inspect and maintain the local portal-sync store");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  portal-admin keys                          List tracked logical keys");
    eprintln!("  portal-admin get <key> [identity]          Print a stored record");
    eprintln!("  portal-admin set <key> <identity> <json>   Write a record locally (published when a node next starts)");
    eprintln!("  portal-admin meta [identity]               Print sync timestamps");
    eprintln!("  portal-admin migrate <legacy> <new>        Copy a legacy record if <new> is empty");
    eprintln!("  portal-admin chunk-put <content>           Store a chunk, print its address");
    eprintln!("  portal-admin chunk-get <address>           Print a chunk");
    eprintln!("  portal-admin peers                         Print the effective peer list");
    eprintln!("  portal-admin set-peers <csv>               Set the local peer-list override");
    eprintln!();
    eprintln!("Keys may be given by full name (social-portal-likes) or short name (likes).");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORTAL_DATA_DIR  Store directory (default: ./portal-data)");
    eprintln!("  PORTAL_PEERS     Comma-separated peer list (overrides set-peers)");
    eprintln!("  PORTAL_ROOT      Overlay root namespace (default: social-portal)");
}

/// Resolve a short logical key name to its storage name; pass anything else through.
fn resolve_key(name: &str) -> String {
    LogicalKey::parse(name)
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| name.to_string())
}

fn arg(args: &[String], i: usize, cmd: &str, what: &str) -> std::result::Result<String, String> {
    args.get(i)
        .cloned()
        .ok_or_else(|| format!("{} requires a {} argument", cmd, what))
}

fn parse_command(args: &[String]) -> std::result::Result<Command, String> {
    let Some(cmd) = args.get(1) else {
        return Err("missing command".into());
    };
    let identity = |i: usize| Identity::new(args.get(i).map(String::as_str));

    let command = match cmd.as_str() {
        "keys" => Command::Keys,
        "get" => Command::Get {
            key: resolve_key(&arg(args, 2, "get", "key")?),
            identity: identity(3),
        },
        "set" => Command::Set {
            key: resolve_key(&arg(args, 2, "set", "key")?),
            identity: Identity::from(arg(args, 3, "set", "identity")?),
            json: arg(args, 4, "set", "json")?,
        },
        "meta" => Command::Meta { identity: identity(2) },
        "migrate" => Command::Migrate {
            legacy_key: arg(args, 2, "migrate", "legacy_key")?,
            new_key: arg(args, 3, "migrate", "new_key")?,
        },
        "chunk-put" => Command::ChunkPut {
            content: arg(args, 2, "chunk-put", "content")?,
        },
        "chunk-get" => Command::ChunkGet {
            address: arg(args, 2, "chunk-get", "address")?,
        },
        "peers" => Command::Peers,
        "set-peers" => Command::SetPeers {
            csv: arg(args, 2, "set-peers", "csv")?,
        },
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(command)
}

fn run(command: Command, config: &SyncConfig) -> Result<()> {
    if let Command::Keys = command {
        for key in LogicalKey::ALL {
            println!("{}", key);
        }
        return Ok(());
    }

    // The admin tool never talks to peers. `set` leaves the key unpublished so
    // the next node to start it bootstraps the record onto the overlay.
    let store = SyncStore::open(config, Arc::new(MemoryOverlay::new()))?;

    match command {
        Command::Keys => {}
        Command::Get { key, identity } => match store.local().get(&scope(&key, &identity)) {
            Some(raw) => println!("{}", raw),
            None => println!("(none)"),
        },
        Command::Set { key, identity, json } => {
            let value: serde_json::Value = serde_json::from_str(&json)
                .map_err(|e| Error::InvalidInput(format!("value is not JSON: {}", e)))?;
            let raw = serde_json::to_string(&value)?;
            let status = store
                .local()
                .set(&scope(&key, &identity), &raw)
                .and(store.meta().bump(&identity, &key, 0));
            if let Some(e) = status.error() {
                return Err(Error::Storage(e.to_string()));
            }
            println!("Saved {}", scope(&key, &identity));
        }
        Command::Meta { identity } => {
            let meta = store.meta().snapshot(&identity);
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Command::Migrate { legacy_key, new_key } => {
            let outcome = migrate(store.local(), &legacy_key, &new_key);
            println!("{:?}", outcome);
        }
        Command::ChunkPut { content } => {
            let (address, status) = store.chunks().store_with_status(&content);
            if let Some(e) = status.error() {
                return Err(Error::Storage(e.to_string()));
            }
            println!("{}", address);
        }
        Command::ChunkGet { address } => {
            println!("{}", store.chunks().retrieve(&address));
        }
        Command::Peers => {
            let peers = parse_peers(&config.peers_csv(store.local()));
            if peers.is_empty() {
                println!("(none - isolated)");
            } else {
                for peer in peers {
                    println!("{}", peer);
                }
            }
        }
        Command::SetPeers { csv } => {
            if let Some(e) = set_peers_config(store.local(), &csv).error() {
                return Err(Error::Storage(e.to_string()));
            }
            println!("Peer override set ({} peers)", parse_peers(&csv).len());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_admin=info,portal_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if matches!(args.get(1).map(String::as_str), Some("-h" | "--help" | "help")) {
        print_usage();
        std::process::exit(0);
    }

    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let config = SyncConfig::from_env();
    if let Err(e) = run(command, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
