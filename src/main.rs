mod crawler;
mod currency;
mod fetch;
mod pacing;
mod parser;
mod record;
mod render;
mod settings;
mod sink;
#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use url::Url;

use crawler::Crawler;
use fetch::HttpFetcher;
use pacing::Pacer;
use render::ChromeSession;
use settings::Settings;
use sink::CsvSink;

#[derive(Parser)]
#[command(name = "autos_scraper", about = "Used-car listings scraper (MercadoLibre Argentina) to CSV")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape listing pages and append complete cars to the CSV (default)
    Run {
        /// Pages to scrape (default: settings max_pages)
        #[arg(short = 'n', long)]
        pages: Option<usize>,
        /// Output CSV (default: settings output_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fetch and print the exchange-rate snapshot
    Rate,
    /// Parse a saved listing page offline and print its cards
    Parse {
        /// HTML file of a listing page
        file: PathBuf,
        /// URL the page was saved from, used to resolve relative links
        #[arg(long)]
        page_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let command = cli.command.unwrap_or(Commands::Run {
        pages: None,
        output: None,
    });

    match command {
        Commands::Run { pages, output } => {
            let pages = pages.unwrap_or(settings.max_pages);
            let output = output.unwrap_or_else(|| settings.output_path.clone());

            let fetcher = HttpFetcher::new(&settings, Pacer::from_settings(&settings))?;
            let rate = currency::fetch_rate(fetcher.client(), &settings.rate_url, settings.fallback_rate).await;
            let session = ChromeSession::new(settings.render_settle());

            let sink = CsvSink::new(output);
            println!("Scraping {} pages into {}...", pages, sink.path().display());

            let crawler = Crawler::new(settings, fetcher, session, rate, sink);
            let stats = crawler.run(pages).await?;
            println!(
                "Done: {}/{} pages fetched, {} listings, {} rows written ({} discarded, {} skipped).",
                stats.pages_fetched,
                stats.pages,
                stats.listings,
                stats.written,
                stats.discarded,
                stats.skipped
            );
        }
        Commands::Rate => {
            let client = reqwest::Client::builder()
                .timeout(settings.request_timeout())
                .build()?;
            let rate = currency::fetch_rate(&client, &settings.rate_url, settings.fallback_rate).await;
            if rate.is_fallback {
                println!("Sell rate: {} (fallback, source unavailable)", rate.sell);
            } else {
                println!("Sell rate: {}", rate.sell);
            }
        }
        Commands::Parse { file, page_url } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let base = page_url
                .as_deref()
                .map(Url::parse)
                .transpose()
                .context("Invalid --page-url")?;

            let cards = parser::listing::parse_cards(&html, base.as_ref());
            if cards.is_empty() {
                println!("No listings found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:<4} | {:>14} | {:<28} | Detail",
                "#", "Title", "Cur", "Amount", "Location"
            );
            println!("{}", "-".repeat(100));
            for (i, card) in cards.iter().enumerate() {
                match card {
                    Ok(c) => println!(
                        "{:>3} | {:<32} | {:<4} | {:>14} | {:<28} | {}",
                        i + 1,
                        truncate(c.title.as_deref().unwrap_or("-"), 32),
                        c.currency_symbol.as_deref().unwrap_or("-"),
                        c.price_fraction.as_deref().unwrap_or("-"),
                        truncate(c.location.as_deref().unwrap_or(record::UNSPECIFIED_LOCATION), 28),
                        c.detail_url.as_deref().unwrap_or("-"),
                    ),
                    Err(e) => println!("{:>3} | unreadable card: {}", i + 1, e),
                }
            }
            println!("\n{} listings", cards.len());
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
