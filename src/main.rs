//! Command-line entry point.
//!
//! # Usage
//!
//! ```bash
//! # HTTP server with an embedded hit worker
//! shortener-hits serve
//!
//! # HTTP server only; workers run as separate processes
//! shortener-hits serve --no-worker
//!
//! # Standalone worker (needs QUEUE_BACKEND=redis_streams)
//! shortener-hits worker
//!
//! # Hit report for one link
//! shortener-hits stats abc12 --days 7 --top 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use shortener_hits::application::services::{LinkReport, StatsService};
use shortener_hits::config::{self, Config};
use shortener_hits::domain::repositories::DimensionCount;
use shortener_hits::infrastructure::factory::{connect_analytics, connect_database};
use shortener_hits::infrastructure::persistence::PgAggregateStore;
use shortener_hits::server;

/// Hit-counting service for short links.
#[derive(Parser)]
#[command(name = "shortener-hits")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the redirect server (default)
    Serve {
        /// Do not run a hit worker in this process
        #[arg(long)]
        no_worker: bool,
    },

    /// Run a standalone hit worker
    Worker,

    /// Show the hit report for a short code
    Stats {
        /// Short code to report on
        code: String,

        /// Days covered by the daily series
        #[arg(short, long, default_value_t = 7)]
        days: u32,

        /// Entries per breakdown
        #[arg(short, long, default_value_t = 5)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env()?;
    init_tracing(&config)?;

    match cli.command.unwrap_or(Commands::Serve { no_worker: false }) {
        Commands::Serve { no_worker } => {
            config.print_summary();
            server::run(config, !no_worker).await
        }
        Commands::Worker => {
            config.print_summary();
            server::run_worker(config).await
        }
        Commands::Stats { code, days, top } => print_stats(&config, &code, days, top).await,
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid RUST_LOG filter '{}'", config.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

async fn print_stats(config: &Config, code: &str, days: u32, top: usize) -> Result<()> {
    let pool = Arc::new(connect_database(config).await?);
    let analytics = connect_analytics(config).await?;
    let service = StatsService::new(Arc::new(PgAggregateStore::new(pool)), analytics);

    let report = service.link_report(code, days, top).await?;
    render_report(&report);

    Ok(())
}

fn render_report(report: &LinkReport) {
    println!(
        "{} {}",
        "Hits for".bright_blue().bold(),
        report.short_code.bright_white().bold()
    );
    println!();

    println!(
        "  Total:         {}",
        report.total_hits.to_string().bright_green().bold()
    );
    println!(
        "  Raw events:    {}",
        report.raw_hits.to_string().bright_green()
    );
    match report.last_accessed {
        Some(at) => println!("  Last accessed: {}", at.to_rfc3339().bright_white()),
        None => println!("  Last accessed: {}", "never".dimmed()),
    }

    render_breakdown("Devices", &report.devices);
    render_breakdown("Browsers", &report.browsers);
    render_breakdown("Countries", &report.countries);
    render_breakdown("Referers", &report.referers);

    println!();
    println!("  {}", "Daily".bright_blue());
    if report.daily.is_empty() {
        println!("    {}", "no hits in range".dimmed());
    }
    for day in &report.daily {
        println!("    {}  {}", day.day, day.hits.to_string().bright_green());
    }
    println!();
}

fn render_breakdown(title: &str, rows: &[DimensionCount]) {
    println!();
    println!("  {}", title.bright_blue());

    if rows.is_empty() {
        println!("    {}", "none".dimmed());
        return;
    }

    for row in rows {
        println!("    {:<32} {}", row.value, row.hits.to_string().bright_green());
    }
}
