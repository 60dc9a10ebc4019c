use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "checkout-cli")]
#[command(about = "Client for the checkout service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000", env = "CHECKOUT_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one or more checkouts
    Checkout {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        cost_spend: Option<f64>,
        #[arg(long)]
        item_count: Option<i64>,
        /// Number of times to submit the checkout
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Pause between submissions, in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Check service health
    Health,
    /// Show telemetry queue and delivery counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Checkout {
            username,
            email,
            cost_spend,
            item_count,
            repeat,
            interval_ms,
        } => {
            let body = json!({
                "username": username,
                "email": email,
                "cost_spend": cost_spend,
                "item_count": item_count,
            });
            for i in 0..repeat {
                let res = client
                    .post(format!("{}/checkout", cli.url))
                    .json(&body)
                    .send()
                    .await?;
                print_response(res).await?;
                if interval_ms > 0 && i + 1 < repeat {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
        Commands::Health => {
            let res = client.get(format!("{}/healthz", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Stats => {
            let res = client.get(format!("{}/telemetry/stats", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    if !status.is_success() {
        eprintln!("Error: service returned status {} (request {})", status, request_id);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
