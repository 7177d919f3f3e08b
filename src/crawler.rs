use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use crate::currency::{self, ExchangeRate};
use crate::fetch::DocumentSource;
use crate::pacing::{Pacer, Pause};
use crate::parser::{detail, listing};
use crate::record::{AttributeMap, CarRecord, Verdict};
use crate::render::Renderer;
use crate::settings::Settings;
use crate::sink::CsvSink;

/// Counters returned after a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub pages: usize,
    pub pages_fetched: usize,
    pub listings: usize,
    pub written: usize,
    pub discarded: usize,
    pub skipped: usize,
}

/// Candidate records of one listing page plus the cards that could not be read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageExtract {
    pub records: Vec<CarRecord>,
    pub skipped: usize,
}

/// Where a detail page is in the fetch → render fallback.
enum DetailState {
    Fetched(String),
    NeedsRender,
    Rendered(String),
    Failed,
}

/// Sequential listing crawler: one page at a time, one listing at a time.
pub struct Crawler<S, R> {
    settings: Settings,
    source: S,
    renderer: R,
    pacer: Pacer,
    rate: ExchangeRate,
    sink: CsvSink,
}

impl<S: DocumentSource, R: Renderer> Crawler<S, R> {
    pub fn new(settings: Settings, source: S, renderer: R, rate: ExchangeRate, sink: CsvSink) -> Self {
        let pacer = Pacer::from_settings(&settings);
        Self {
            settings,
            source,
            renderer,
            pacer,
            rate,
            sink,
        }
    }

    /// Scrape pages `1..=max_pages`, appending accepted rows after each page.
    pub async fn run(&self, max_pages: usize) -> Result<RunStats> {
        let mut stats = RunStats {
            pages: max_pages,
            ..RunStats::default()
        };

        let pb = ProgressBar::new(max_pages as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({msg})")?
                .progress_chars("=> "),
        );

        for page in 1..=max_pages {
            if page > 1 {
                self.pacer.pause(Pause::Page).await;
            }

            let url = self.settings.page_url(page);
            pb.set_message(format!("{} rows", stats.written));
            info!("Scraping page {}/{}: {}", page, max_pages, url);

            match self.source.fetch(&url).await {
                Some(html) => {
                    stats.pages_fetched += 1;
                    self.scrape_page(&html, &url, &mut stats).await?;
                }
                None => warn!("Page {} yielded no document, moving on", page),
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Run complete: {} rows written, {} discarded, {} skipped",
            stats.written, stats.discarded, stats.skipped
        );
        Ok(stats)
    }

    async fn scrape_page(&self, html: &str, page_url: &str, stats: &mut RunStats) -> Result<()> {
        let PageExtract { records, skipped } = self.extract_listings(html, page_url).await;
        stats.listings += records.len() + skipped;
        stats.skipped += skipped;

        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            match record.validate() {
                Verdict::Accept => accepted.push(record),
                Verdict::Reject { missing } => {
                    info!(
                        "Discarding {} {}: missing {}",
                        record.brand.as_deref().unwrap_or("?"),
                        record.model.as_deref().unwrap_or("?"),
                        missing
                    );
                    stats.discarded += 1;
                }
            }
        }

        stats.written += self.sink.append(&accepted)?;
        Ok(())
    }

    /// Candidate records for every listing on the page, in document order.
    /// Detail pages are fetched one by one; nothing is validated here.
    pub async fn extract_listings(&self, html: &str, page_url: &str) -> PageExtract {
        let base = Url::parse(page_url).ok();
        let cards = listing::parse_cards(html, base.as_ref());
        info!("Found {} listings", cards.len());

        let mut records = Vec::with_capacity(cards.len());
        let mut skipped = 0;

        for (idx, card) in cards.into_iter().enumerate() {
            let card = match card {
                Ok(card) => card,
                Err(e) => {
                    warn!("Skipping listing #{}: {}", idx + 1, e);
                    skipped += 1;
                    continue;
                }
            };

            let attributes = match card.detail_url.as_deref() {
                Some(url) => {
                    self.pacer.pause(Pause::Detail).await;
                    self.fetch_details(url).await
                }
                None => AttributeMap::new(),
            };

            let price = currency::normalize(
                card.price_fraction.as_deref(),
                card.currency_symbol.as_deref(),
                self.rate,
            );
            records.push(CarRecord::assemble(price, card.location, &attributes));

            self.pacer.pause(Pause::Listing).await;
        }

        PageExtract { records, skipped }
    }

    /// Fetch a detail page and extract its specs, re-rendering once in a
    /// headless browser when the static markup has no specs table.
    pub async fn fetch_details(&self, url: &str) -> AttributeMap {
        let mut state = match self.source.fetch(url).await {
            Some(html) => DetailState::Fetched(html),
            None => DetailState::Failed,
        };

        loop {
            state = match state {
                DetailState::Fetched(html) => {
                    let details = detail::extract_details(&html);
                    if !details.is_empty() {
                        return details;
                    }
                    info!("No specs table in static markup for {}, rendering", url);
                    DetailState::NeedsRender
                }
                DetailState::NeedsRender => {
                    // The browser hits the site too.
                    self.pacer.pause(Pause::Request).await;
                    match self.renderer.render(url).await {
                        Ok(html) => DetailState::Rendered(html),
                        Err(e) => {
                            warn!("Render failed for {}: {:#}", url, e);
                            DetailState::Failed
                        }
                    }
                }
                DetailState::Rendered(html) => {
                    let details = detail::extract_details(&html);
                    if details.is_empty() {
                        warn!("Rendered page for {} still has no specs table", url);
                    }
                    return details;
                }
                DetailState::Failed => {
                    warn!("No details for {}", url);
                    return AttributeMap::new();
                }
            };
        }
    }
}
