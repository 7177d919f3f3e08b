use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use super::text_of;

static ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.ui-search-layout__item").unwrap());
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.poly-component__title").unwrap());
static FRACTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.andes-money-amount__fraction").unwrap());
static SYMBOL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.andes-money-amount__currency-symbol").unwrap());
static LOCATION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.poly-component__location").unwrap());

/// Inline data of one search-result card, before the detail page is visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    pub title: Option<String>,
    pub detail_url: Option<String>,
    pub price_fraction: Option<String>,
    pub currency_symbol: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("title link has no href")]
    MissingHref,
    #[error("bad detail url {href:?}: {source}")]
    BadUrl {
        href: String,
        source: url::ParseError,
    },
}

/// Enumerate the result cards on a listing page, in document order.
///
/// Each card is parsed independently so one malformed card does not hide
/// the rest of the page. Relative links are resolved against `base`.
pub fn parse_cards(html: &str, base: Option<&Url>) -> Vec<Result<ListingCard, CardError>> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM_SEL)
        .map(|item| parse_card(item, base))
        .collect()
}

fn parse_card(item: ElementRef<'_>, base: Option<&Url>) -> Result<ListingCard, CardError> {
    let first_text = |sel: &Selector| item.select(sel).next().map(text_of);

    let (title, detail_url) = match item.select(&TITLE_SEL).next() {
        Some(link) => {
            let href = link.value().attr("href").ok_or(CardError::MissingHref)?;
            (Some(text_of(link)), Some(resolve(href, base)?))
        }
        None => (None, None),
    };

    Ok(ListingCard {
        title,
        detail_url,
        price_fraction: first_text(&FRACTION_SEL),
        currency_symbol: first_text(&SYMBOL_SEL),
        location: first_text(&LOCATION_SEL),
    })
}

fn resolve(href: &str, base: Option<&Url>) -> Result<String, CardError> {
    let href = href.trim();
    let parsed = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    };
    parsed.map(String::from).map_err(|source| CardError::BadUrl {
        href: href.to_string(),
        source,
    })
}
