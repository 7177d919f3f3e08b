use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::pacing::{Pacer, Pause};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited (429)")]
    RateLimited,
    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// Anything that can turn a URL into markup. `None` means "no document".
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Plain HTTP retrieval with browser-like headers and bounded 429 retries.
pub struct HttpFetcher {
    client: reqwest::Client,
    pacer: Pacer,
    max_retries: u32,
    cooldown: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings, pacer: Pacer) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("es-AR,es;q=0.9,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            pacer,
            max_retries: settings.max_retries,
            cooldown: settings.cooldown(),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::Status(status)),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        for attempt in 0..=self.max_retries {
            self.pacer.pause(Pause::Request).await;

            match self.get_once(url).await {
                Ok(body) => {
                    info!("Fetched {} ({} bytes)", url, body.len());
                    return Some(body);
                }
                Err(FetchError::RateLimited) if attempt < self.max_retries => {
                    let backoff = backoff(self.cooldown, attempt);
                    warn!(
                        "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!("No document for {}: {}", url, e);
                    return None;
                }
            }
        }
        None
    }
}

fn backoff(cooldown: Duration, attempt: u32) -> Duration {
    cooldown.saturating_mul(2u32.saturating_pow(attempt))
}
