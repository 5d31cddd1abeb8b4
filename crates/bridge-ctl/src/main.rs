//! bridge-ctl: command-line client for the request bridge.

use anyhow::{Context, Result};

use bridge_core::config::BridgeConfig;

mod cmd;

fn print_usage() {
    println!("Usage: bridge-ctl [--config <path>] <command>");
    println!();
    println!("Commands:");
    println!("  signup <name> <email> <password>   Register a user");
    println!("  login <email> <password>           Authenticate a user");
    println!("  invoke <action> [fields-json]      Send any action with raw fields");
    println!("  pending                            Show requests waiting for a worker");
    println!();
    println!("Options:");
    println!("  --config <path>   Config file (default: $BRIDGE_CONFIG or ~/.config/bridge/config.toml)");
    println!();
    println!("Exit status is 2 when the bridge answered with an error.");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --config option
    let mut config_path = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            i += 1;
            config_path = Some(args.get(i).context("--config requires a value")?.clone());
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => BridgeConfig::load_from(std::path::Path::new(path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => BridgeConfig::load().context("failed to load config")?,
    };

    match remaining.as_slice() {
        ["signup", name, email, password] => cmd::auth::signup(&config, name, email, password).await,
        ["login", email, password]        => cmd::auth::login(&config, email, password).await,
        ["invoke", action]                => cmd::invoke::invoke(&config, action, None).await,
        ["invoke", action, fields]        => cmd::invoke::invoke(&config, action, Some(fields)).await,
        ["pending"]                       => cmd::queue::pending(&config).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
