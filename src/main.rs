//! CLI for lcmchan
//!
//! Subcommands:
//! - `loopback`: publish a run of counters through a client and read them back
//! - `config`: print the effective settings as JSON

use std::time::{Duration, Instant};

use clap::Parser;
use lcmchan::config::{Settings, load_config};
use lcmchan::utils::logging;
use lcmchan::{Client, RecvError};
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "lcmchan")]
enum Command {
    /// Publish `count` 4-byte counters on one channel and receive them back
    Loopback {
        #[arg(long, default_value = "COUNTER")]
        channel: String,
        #[arg(long, default_value_t = 10_000)]
        count: u32,
        /// Subscription queue capacity (defaults to `count`)
        #[arg(long)]
        capacity: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cmd {
        Command::Loopback {
            channel,
            count,
            capacity,
        } => run_loopback(&settings, &channel, count, capacity).await,
        Command::Config => print_config(&settings),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn print_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

async fn run_loopback(
    settings: &Settings,
    channel: &str,
    count: u32,
    capacity: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::from_settings(settings)?;
    let capacity = capacity.unwrap_or(count.max(1) as usize);
    let mut sub = client.subscribe(channel, capacity)?;
    let (publisher, mut errors) = client.publisher(channel)?;

    info!(channel, count, capacity, "starting loopback run");
    let started = Instant::now();

    let producer = tokio::spawn(async move {
        for i in 0..count {
            publisher.send(i.to_be_bytes().to_vec()).await?;
        }
        Ok::<_, lcmchan::PublishError>(())
    });

    let mut received = 0u64;
    let mut in_order = true;
    let mut last: Option<u32> = None;
    loop {
        match sub.recv_timeout(Duration::from_millis(500)).await {
            Ok(msg) => {
                let value = <[u8; 4]>::try_from(&msg.data[..])
                    .map(u32::from_be_bytes)
                    .ok();
                in_order &= matches!((last, value), (None, Some(_)))
                    || matches!((last, value), (Some(prev), Some(v)) if v > prev);
                last = value;
                received += 1;
                if received == u64::from(count) {
                    break;
                }
            }
            // Anything still missing after a quiet period was dropped.
            Err(RecvError::Timeout) | Err(RecvError::Closed) => break,
        }
    }

    producer.await??;
    let elapsed = started.elapsed();
    let mut publish_errors = 0u64;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(100), errors.recv()).await {
        publish_errors += 1;
    }

    let summary = json!({
        "channel": channel,
        "published": count,
        "received": received,
        "dropped": sub.drops(),
        "in_order": in_order,
        "publish_errors": publish_errors,
        "elapsed_ms": elapsed.as_millis() as u64,
    });
    client.destroy()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
