use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the account relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay status
    Status,
    /// Show queue counts and failed jobs
    Queues,
    /// Show the capacity admission state
    Capacity,
    /// Move a failed job back to waiting
    Retry {
        /// Queue name: publish or confirm
        queue: String,
        /// Job id (the request's reference id)
        id: String,
    },
    /// Submit a request from a JSON file
    Submit {
        /// Path to an account change request
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => admin_get(&client, &cli.url, "status", headers).await?,
        Commands::Queues => admin_get(&client, &cli.url, "queues", headers).await?,
        Commands::Capacity => admin_get(&client, &cli.url, "capacity", headers).await?,
        Commands::Retry { queue, id } => {
            client
                .post(format!("{}/admin/queues/{}/jobs/{}/retry", cli.url, queue, id))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Submit { file } => {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            client
                .post(format!("{}/v1/requests", cli.url))
                .json(&body)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn admin_get(
    client: &reqwest::Client,
    url: &str,
    path: &str,
    headers: HeaderMap,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .get(format!("{}/admin/{}", url, path))
        .headers(headers)
        .send()
        .await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
