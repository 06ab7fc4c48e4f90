// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flowzap - automated payment-funnel messaging.
//!
//! This is the binary entry point for the Flowzap service.

use clap::{Parser, Subcommand};
use flowzap::serve;

/// Flowzap - automated payment-funnel messaging.
#[derive(Parser, Debug)]
#[command(name = "flowzap", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook intake server and funnel engine.
    Serve,
    /// Load and validate configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match flowzap_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            flowzap_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(errors) = flowzap_config::validate_for_serve(&config) {
                flowzap_config::render_errors(&errors);
                std::process::exit(1);
            }
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("flowzap serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Check) => {
            println!(
                "flowzap: config ok ({} channel(s), {} product(s))",
                config.dispatch.channels.len(),
                config.products.len()
            );
        }
        None => {
            println!("flowzap: use --help for available commands");
        }
    }
}
