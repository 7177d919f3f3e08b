use std::ops::RangeInclusive;
use std::time::Duration;

use rand::{rng, Rng};
use tracing::debug;

use crate::settings::Settings;

/// Which politeness window to draw from.
#[derive(Debug, Clone, Copy)]
pub enum Pause {
    /// Before every HTTP request.
    Request,
    /// Before fetching a listing's detail page.
    Detail,
    /// After a listing has been processed.
    Listing,
    /// Between listing pages.
    Page,
}

/// Randomized delays that keep the outbound request rate low.
#[derive(Debug, Clone)]
pub struct Pacer {
    request: RangeInclusive<u64>,
    detail: RangeInclusive<u64>,
    listing: RangeInclusive<u64>,
    page: RangeInclusive<u64>,
}

impl Pacer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            request: settings.request_delay(),
            detail: settings.detail_delay(),
            listing: settings.listing_delay(),
            page: settings.page_delay(),
        }
    }

    pub fn draw(&self, pause: Pause) -> Duration {
        let range = match pause {
            Pause::Request => &self.request,
            Pause::Detail => &self.detail,
            Pause::Listing => &self.listing,
            Pause::Page => &self.page,
        };
        Duration::from_millis(rng().random_range(range.clone()))
    }

    pub async fn pause(&self, pause: Pause) {
        let wait = self.draw(pause);
        if wait.is_zero() {
            return;
        }
        debug!("Pausing {:.1}s ({:?})", wait.as_secs_f64(), pause);
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_stay_inside_window() {
        let pacer = Pacer::from_settings(&Settings::default());
        for _ in 0..200 {
            let d = pacer.draw(Pause::Page).as_millis();
            assert!((3000..=6000).contains(&d));
            let d = pacer.draw(Pause::Detail).as_millis();
            assert!((1000..=3000).contains(&d));
        }
    }

    #[test]
    fn zero_window_never_waits() {
        let settings = Settings {
            request_delay_min_ms: 0,
            request_delay_max_ms: 0,
            ..Settings::default()
        };
        let pacer = Pacer::from_settings(&settings);
        assert!(pacer.draw(Pause::Request).is_zero());
    }
}
