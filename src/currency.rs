use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Marker the site prints in front of dollar-denominated prices.
const FOREIGN_MARKER: &str = "US$";
const GROUPING: &[char] = &['.', ',', ' ', '\u{a0}'];

/// Foreign→local sell rate, fetched once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRate {
    pub sell: f64,
    pub is_fallback: bool,
}

impl ExchangeRate {
    pub fn new(sell: f64) -> Self {
        Self {
            sell,
            is_fallback: false,
        }
    }

    pub fn fallback(sell: f64) -> Self {
        Self {
            sell,
            is_fallback: true,
        }
    }
}

#[derive(Deserialize)]
struct Quote {
    venta: f64,
}

/// Fetch the current sell rate, falling back to `fallback` on any failure.
pub async fn fetch_rate(client: &reqwest::Client, url: &str, fallback: f64) -> ExchangeRate {
    match try_fetch_rate(client, url).await {
        Ok(sell) => {
            info!("Exchange rate snapshot: {} (from {})", sell, url);
            ExchangeRate::new(sell)
        }
        Err(e) => {
            warn!("Exchange rate unavailable ({:#}), using fallback {}", e, fallback);
            ExchangeRate::fallback(fallback)
        }
    }
}

async fn try_fetch_rate(client: &reqwest::Client, url: &str) -> Result<f64> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        bail!("quote endpoint returned {}", response.status());
    }
    let body = response.text().await?;
    parse_quote(&body)
}

fn parse_quote(body: &str) -> Result<f64> {
    let quote: Quote = serde_json::from_str(body).context("Malformed quote body")?;
    if !quote.venta.is_finite() || quote.venta <= 0.0 {
        bail!("nonsensical sell rate {}", quote.venta);
    }
    Ok(quote.venta)
}

/// Convert a grouped amount (`"10.000"`) into a local-currency integer.
/// Returns `None` when either piece is missing or the amount does not parse.
pub fn normalize(raw_amount: Option<&str>, currency_symbol: Option<&str>, rate: ExchangeRate) -> Option<i64> {
    let raw_amount = raw_amount?;
    let symbol = currency_symbol?.trim();

    let digits: String = raw_amount.trim().chars().filter(|c| !GROUPING.contains(c)).collect();
    let amount = digits.parse::<i64>().ok()?;

    if symbol.contains(FOREIGN_MARKER) {
        let converted = amount as f64 * rate.sell;
        if !converted.is_finite() || converted.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(converted.round() as i64)
    } else {
        Some(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{dead_url, ScriptedServer};

    const RATE: ExchangeRate = ExchangeRate {
        sell: 1220.0,
        is_fallback: false,
    };

    #[test]
    fn dollars_are_converted() {
        assert_eq!(normalize(Some("10.000"), Some("US$"), RATE), Some(12_200_000));
        assert_eq!(normalize(Some("8.500"), Some(" US$ "), RATE), Some(10_370_000));
    }

    #[test]
    fn pesos_pass_through() {
        assert_eq!(normalize(Some("15.300.000"), Some("$"), RATE), Some(15_300_000));
        assert_eq!(normalize(Some("900"), Some("$"), RATE), Some(900));
    }

    #[test]
    fn missing_or_garbled_inputs_are_unavailable() {
        assert_eq!(normalize(None, Some("US$"), RATE), None);
        assert_eq!(normalize(Some("10.000"), None, RATE), None);
        assert_eq!(normalize(None, None, RATE), None);
        assert_eq!(normalize(Some("consultar"), Some("$"), RATE), None);
        assert_eq!(normalize(Some(""), Some("$"), RATE), None);
    }

    #[test]
    fn huge_foreign_amounts_do_not_overflow() {
        let amount = i64::MAX.to_string();
        assert_eq!(normalize(Some(&amount), Some("US$"), RATE), None);
    }

    #[test]
    fn quote_body_parses_sell_field() {
        let body = r#"{"moneda":"USD","casa":"blue","nombre":"Blue","compra":1195,"venta":1215.5}"#;
        assert_eq!(parse_quote(body).unwrap(), 1215.5);
    }

    #[test]
    fn quote_without_sell_field_is_rejected() {
        assert!(parse_quote(r#"{"compra":1195}"#).is_err());
        assert!(parse_quote("<html>maintenance</html>").is_err());
        assert!(parse_quote(r#"{"venta":0}"#).is_err());
    }

    #[tokio::test]
    async fn unavailable_quote_service_falls_back() {
        let server = ScriptedServer::start(vec![(503, "maintenance")]).await;
        let rate = fetch_rate(&reqwest::Client::new(), &server.url, 1220.0).await;
        assert_eq!(rate, ExchangeRate::fallback(1220.0));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn unreachable_quote_service_falls_back() {
        let url = dead_url().await;
        let rate = fetch_rate(&reqwest::Client::new(), &url, 1220.0).await;
        assert_eq!(rate, ExchangeRate::fallback(1220.0));
    }

    #[tokio::test]
    async fn live_quote_is_not_a_fallback() {
        let server = ScriptedServer::start(vec![(200, r#"{"compra":1195,"venta":1215.5}"#)]).await;
        let rate = fetch_rate(&reqwest::Client::new(), &server.url, 1220.0).await;
        assert_eq!(rate, ExchangeRate::new(1215.5));
    }
}
