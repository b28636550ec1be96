use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "chaingate-cli")]
#[command(about = "Operator tooling for the chaingate gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch per-chain RPC endpoints from the public chain directory
    FetchEndpoints {
        /// Only include these chain ids (may be repeated)
        #[arg(short, long)]
        chain_id: Vec<u64>,

        /// Write the JSON to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Directory URL to query
        #[arg(long, default_value = chaingate_core::directory::CHAIN_DIRECTORY_URL)]
        directory_url: String,
    },

    /// Generate an API key file without starting the gateway
    Keygen {
        /// Where to write the keys
        #[arg(short, long, default_value = "./apikey/keys.txt")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::FetchEndpoints { chain_id, output, directory_url } => {
            commands::fetch_endpoints(&directory_url, &chain_id, output.as_deref())
                .await
                .context("fetch-endpoints failed")
        }
        Commands::Keygen { output } => commands::keygen(&output).context("keygen failed"),
    }
}
