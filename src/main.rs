use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use babystepper::config::AppConfig;
use babystepper::web_server;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the BabyStepper web server.
    Start {
        #[arg(long, env = "PORT", default_value_t = 3000, help = "Port for the web server.")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Initialize tracing (logging) subscriber
    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,babystepper=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port } => {
            info!("Starting BabyStepper on port {}...", port);

            let config = AppConfig::from_env();
            if config.api_key.is_none() {
                // Not fatal: the endpoint reports this per-request.
                error!("OPENAI_API_KEY is not set; completion requests will fail until it is configured");
            }

            let mut server_handle = tokio::spawn(async move {
                web_server::start_web_server(port, config).await
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, shutting down...");
                    server_handle.abort();
                }
                res = &mut server_handle => {
                    match res {
                        Ok(inner) => inner.context("Web server exited")?,
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            info!("Shutdown complete.");
        }
    }

    Ok(())
}
