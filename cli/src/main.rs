//! chainsync CLI — plan configuration changes and simulate indexer graphs.
//!
//! Usage:
//! ```bash
//! chainsync plan ./configurations.json
//! chainsync simulate --head 500 --rollback 320 --batch 100
//! chainsync info
//! ```

mod plan;
mod simulate;

use std::env;
use std::process;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => {
            cmd_info();
            Ok(())
        }
        "plan" => match args.get(2) {
            Some(path) => plan::run(path),
            None => Err(anyhow::anyhow!("plan needs a JSON file")),
        },
        "simulate" => match simulate::Options::parse(&args[2..]) {
            Ok(options) => simulate::run(options).await,
            Err(e) => Err(e),
        },
        "version" | "--version" | "-V" => {
            println!("chainsync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainsync {}", env!("CARGO_PKG_VERSION"));
    println!("Coordinated, rollback-safe sync for graphs of indexers\n");
    println!("USAGE:");
    println!("    chainsync <COMMAND>\n");
    println!("COMMANDS:");
    println!("    plan <FILE>  Show what a configuration change would remove and resync");
    println!("    simulate     Run an in-memory root → child → grandchild graph");
    println!("                 [--head N] [--batch N] [--rollback N]");
    println!("    info         Show ChainSync defaults");
    println!("    version      Print version");
    println!("    help         Print this help");
}

fn cmd_info() {
    let retry = chainsync_core::RetryConfig::default();
    println!("ChainSync v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Default retry: {} attempts, {} ms initial backoff, {} ms cap, x{}",
        retry
            .max_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
        retry.initial_backoff_ms,
        retry
            .max_backoff_ms
            .map_or_else(|| "no".to_string(), |n| n.to_string()),
        retry.multiplier,
    );
    println!("  Ticks: on request, or periodic for roots with tick_interval_ms");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
}
