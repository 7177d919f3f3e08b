use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "autos";
const ENV_PREFIX: &str = "AUTOS";

/// Run configuration. Layered: defaults → `autos.toml` → `AUTOS_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_pages: usize,
    pub page_size: usize,
    /// Listing search URL; `{offset}` is replaced with the 1-based item offset.
    pub listing_url: String,
    pub output_path: PathBuf,
    pub rate_url: String,
    pub fallback_rate: f64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_min_ms: u64,
    pub request_delay_max_ms: u64,
    pub detail_delay_min_ms: u64,
    pub detail_delay_max_ms: u64,
    pub listing_delay_min_ms: u64,
    pub listing_delay_max_ms: u64,
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub max_retries: u32,
    pub render_settle_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_pages: 15,
            page_size: 50,
            listing_url: "https://autos.mercadolibre.com.ar/usados/_Desde_{offset}".into(),
            output_path: PathBuf::from("autos.csv"),
            rate_url: "https://dolarapi.com/v1/dolares/blue".into(),
            fallback_rate: 1220.0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".into(),
            request_timeout_secs: 30,
            request_delay_min_ms: 1000,
            request_delay_max_ms: 3000,
            detail_delay_min_ms: 1000,
            detail_delay_max_ms: 3000,
            listing_delay_min_ms: 1000,
            listing_delay_max_ms: 3000,
            page_delay_min_ms: 3000,
            page_delay_max_ms: 6000,
            rate_limit_cooldown_secs: 30,
            max_retries: 2,
            render_settle_ms: 2000,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            Self::defaults()?
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(env_source()),
        )
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder().add_source(Config::try_from(&Settings::default())?))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to assemble settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Listing page URL for a 1-based page index.
    pub fn page_url(&self, page: usize) -> String {
        let offset = page * self.page_size + 1;
        self.listing_url.replace("{offset}", &offset.to_string())
    }

    pub fn request_delay(&self) -> RangeInclusive<u64> {
        clamp(self.request_delay_min_ms, self.request_delay_max_ms)
    }

    pub fn detail_delay(&self) -> RangeInclusive<u64> {
        clamp(self.detail_delay_min_ms, self.detail_delay_max_ms)
    }

    pub fn listing_delay(&self) -> RangeInclusive<u64> {
        clamp(self.listing_delay_min_ms, self.listing_delay_max_ms)
    }

    pub fn page_delay(&self) -> RangeInclusive<u64> {
        clamp(self.page_delay_min_ms, self.page_delay_max_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn clamp(min: u64, max: u64) -> RangeInclusive<u64> {
    min..=max.max(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offsets_are_linear() {
        let s = Settings::default();
        assert_eq!(
            s.page_url(1),
            "https://autos.mercadolibre.com.ar/usados/_Desde_51"
        );
        assert_eq!(
            s.page_url(3),
            "https://autos.mercadolibre.com.ar/usados/_Desde_151"
        );
    }

    #[test]
    fn inverted_delay_range_collapses_to_min() {
        let s = Settings {
            page_delay_min_ms: 500,
            page_delay_max_ms: 100,
            ..Settings::default()
        };
        assert_eq!(s.page_delay(), 500..=500);
    }

    #[test]
    fn defaults_layer_round_trips() {
        let s = Settings::from_builder(Settings::defaults().unwrap()).unwrap();
        assert_eq!(s.max_pages, 15);
        assert_eq!(s.page_size, 50);
        assert_eq!(s.fallback_rate, 1220.0);
        assert!(s.listing_url.contains("{offset}"));
    }

    #[test]
    fn env_layer_overrides_defaults() {
        let vars = config::Map::from([
            ("AUTOS_MAX_PAGES".to_string(), "3".to_string()),
            ("AUTOS_FALLBACK_RATE".to_string(), "1500.5".to_string()),
        ]);
        let builder = Settings::defaults()
            .unwrap()
            .add_source(env_source().source(Some(vars)));
        let s = Settings::from_builder(builder).unwrap();
        assert_eq!(s.max_pages, 3);
        assert_eq!(s.fallback_rate, 1500.5);
        assert_eq!(s.page_size, 50);
    }
}
