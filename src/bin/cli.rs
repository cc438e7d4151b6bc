//! PulseKV CLI Client
//!
//! Command-line interface for interacting with a PulseKV server.

use clap::{Parser, Subcommand};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue};
use tracing_subscriber::{fmt, EnvFilter};

use pulsekv::{Client, ClientOptions};

/// PulseKV CLI
#[derive(Parser, Debug)]
#[command(name = "pulsekv-cli")]
#[command(about = "CLI for the PulseKV key-value store")]
#[command(version)]
struct Args {
    /// Server endpoint
    #[arg(short, long, default_value = "http://localhost:4338")]
    server: String,

    /// Optional bearer token for the upgrade request
    #[arg(short, long)]
    auth: Option<String>,

    /// Optional server password
    #[arg(short, long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// List key names under a prefix
    ListKeys {
        /// The prefix to list (empty lists everything)
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,pulsekv=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut options = ClientOptions::builder();
    if let Some(token) = &args.auth {
        let mut headers = HeaderMap::new();
        let value = match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(v) => v,
            Err(e) => fatal(&format!("invalid auth token: {}", e)),
        };
        headers.insert("Authorization", value);
        options = options.headers(headers);
    }
    if let Some(password) = &args.password {
        options = options.password(password.as_str());
    }

    let client = match Client::connect(&args.server, options.build()).await {
        Ok(c) => c,
        Err(e) => fatal(&format!("failed to connect to {}: {}", args.server, e)),
    };

    let result = match &args.command {
        Commands::Get { key } => client.get_key(key).await.map(|value| println!("{}", value)),
        Commands::Set { key, value } => client.set_key(key, value).await,
        Commands::ListKeys { prefix } => client.list_keys(prefix).await.map(|keys| {
            for key in keys {
                println!("{}", key);
            }
        }),
    };

    if let Err(e) = result {
        fatal(&e.to_string());
    }

    if let Err(e) = client.close().await {
        tracing::debug!("close failed: {}", e);
    }
}

fn fatal(message: &str) -> ! {
    eprintln!("Fatal error: {}", message);
    std::process::exit(1);
}
