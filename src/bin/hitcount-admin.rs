use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hitcount::config::Config;
use hitcount::models::{parse_timestamp, StatsQuery};
use hitcount::service::HitService;
use hitcount::storage;

#[derive(Parser)]
#[command(name = "hitcount-admin")]
#[command(about = "Hit statistics maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete hits older than the retention window
    Cleanup {
        /// Days of hits to keep
        #[arg(long, default_value_t = 365)]
        days: i64,
    },
    /// Count all hits in a range
    Total {
        /// Range start, `yyyy-MM-dd HH:mm:ss`
        #[arg(long)]
        start: String,
        /// Range end, `yyyy-MM-dd HH:mm:ss`
        #[arg(long)]
        end: String,
    },
    /// Count distinct visitor IPs in a range
    Unique {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Per-URI hit counts
    Stats {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Restrict to these URIs (repeatable)
        #[arg(long = "uri")]
        uris: Vec<String>,
        /// Count distinct IPs instead of raw hits
        #[arg(long)]
        unique: bool,
    },
}

fn timestamp(value: &str, name: &str) -> Result<chrono::NaiveDateTime> {
    parse_timestamp(value)
        .with_context(|| format!("--{name} must match 'yyyy-MM-dd HH:mm:ss', got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let stores = storage::connect(&config.database).await?;
    let service = HitService::new(stores.hits, config.stats.clone());

    match cli.command {
        Commands::Cleanup { days } => {
            let deleted = service.cleanup(days).await?;
            println!("✓ Deleted {} hits older than {} days", deleted, days);
        }
        Commands::Total { start, end } => {
            let total = service
                .total_hits(timestamp(&start, "start")?, timestamp(&end, "end")?)
                .await?;
            println!("{}", total);
        }
        Commands::Unique { start, end } => {
            let unique = service
                .unique_hits(timestamp(&start, "start")?, timestamp(&end, "end")?)
                .await?;
            println!("{}", unique);
        }
        Commands::Stats {
            start,
            end,
            uris,
            unique,
        } => {
            let query = StatsQuery::new(timestamp(&start, "start")?, timestamp(&end, "end")?)
                .with_uris(uris)
                .unique(unique);
            let stats = service.get_stats(&query).await?;
            if stats.is_empty() {
                println!("No hits found.");
            } else {
                println!("{:<20} {:<50} {}", "App", "URI", "Hits");
                println!("{}", "-".repeat(80));
                for stat in stats {
                    println!("{:<20} {:<50} {}", stat.app, stat.uri, stat.hits);
                }
            }
        }
    }

    Ok(())
}
