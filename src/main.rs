//! Resilient API client CLI.
//!
//! Issues one request through the full pipeline (token attachment,
//! refresh, breaker, backoff) and prints the response.
//!
//! ```text
//! resilient-client --config client.toml get /orders
//! resilient-client --token abc post /orders --data '{"table":4}'
//! resilient-client status /health /orders
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use resilient_client::auth::{CredentialStore, MemoryCredentialStore, Token};
use resilient_client::config::loader::{from_env, load_config};
use resilient_client::lifecycle::on_interrupt;
use resilient_client::observability::{logging, metrics};
use resilient_client::{ApiClient, ApiError, ApiResponse, RequestDescriptor};

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Send requests to the backend API with retries, refresh and circuit breaking", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override backend.base_url
    #[arg(short, long)]
    base_url: Option<String>,

    /// Bearer token to start with (instead of the stored one)
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path
    Get { path: String },
    /// POST a JSON body to a path
    Post {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
    /// PUT a JSON body to a path
    Put {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
    /// DELETE a path
    Delete { path: String },
    /// GET each path once and print breaker state
    Status { paths: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => from_env()?,
    };
    if let Some(base_url) = cli.base_url {
        config.backend.base_url = base_url;
    }

    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut builder = ApiClient::builder(config);
    if let Some(token) = cli.token {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token(Token::new(token)));
        builder = builder.credentials(store);
    }
    let client = builder.build()?;

    let interrupt = {
        let client = client.clone();
        on_interrupt(move || client.shutdown())
    };

    let succeeded = match cli.command {
        Commands::Get { path } => run(&client, RequestDescriptor::get(path)).await?,
        Commands::Delete { path } => run(&client, RequestDescriptor::delete(path)).await?,
        Commands::Post { path, data } => run(&client, with_data(RequestDescriptor::post(path), data)?).await?,
        Commands::Put { path, data } => run(&client, with_data(RequestDescriptor::put(path), data)?).await?,
        Commands::Status { paths } => {
            let mut all_ok = true;
            for path in paths {
                if let Err(e) = client.get(&path).await {
                    eprintln!("{}: {}", path, e);
                    all_ok = false;
                }
            }
            print_circuits(&client);
            all_ok
        }
    };

    interrupt.abort();
    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn with_data(request: RequestDescriptor, data: Option<String>) -> Result<RequestDescriptor, Box<dyn std::error::Error>> {
    match data {
        Some(raw) => {
            let body: Value = serde_json::from_str(&raw)?;
            Ok(request.with_body(body))
        }
        None => Ok(request),
    }
}

/// Send one request and print the outcome. Returns whether it succeeded.
async fn run(client: &ApiClient, request: RequestDescriptor) -> Result<bool, Box<dyn std::error::Error>> {
    match client.send(request).await {
        Ok(response) => {
            print_response(&response)?;
            Ok(true)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if let ApiError::CircuitOpen { retry_after, .. } = &e {
                eprintln!("Endpoint is cooling down, try again in {}s", retry_after.as_secs());
            }
            Ok(false)
        }
    }
}

fn print_response(response: &ApiResponse) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Status: {}", response.status());
    match response.json::<Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

fn print_circuits(client: &ApiClient) {
    let circuits = client.circuits();
    if circuits.is_empty() {
        println!("No endpoints called");
        return;
    }
    for c in circuits {
        match c.retry_after {
            Some(wait) => println!(
                "{:<40} {:<10} failures={} retry_in={}s",
                c.target.as_str(),
                c.status,
                c.consecutive_failures,
                wait.as_secs()
            ),
            None => println!(
                "{:<40} {:<10} failures={}",
                c.target.as_str(),
                c.status,
                c.consecutive_failures
            ),
        }
    }
}
