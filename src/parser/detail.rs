use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::text_of;
use crate::record::AttributeMap;

static ROW_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"andes-table__(row|body)").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr, tbody").unwrap());
static KEY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.andes-table__header__container").unwrap());
static VALUE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.andes-table__column--value").unwrap());

/// Pull the specs table out of a detail page.
///
/// Rows are matched by class, not position. A row only counts when it has
/// both a label and a value. An empty map means the table was not in the
/// markup (typically because it is rendered client-side).
pub fn extract_details(html: &str) -> AttributeMap {
    let document = Html::parse_document(html);
    let mut details = AttributeMap::new();

    let rows = document.select(&ROW_SEL).filter(|row| {
        row.value()
            .attr("class")
            .is_some_and(|class| ROW_CLASS_RE.is_match(class))
    });

    for row in rows {
        let key = row.select(&KEY_SEL).next();
        let value = row.select(&VALUE_SEL).next();
        if let (Some(key), Some(value)) = (key, value) {
            details.insert(text_of(key).to_lowercase(), text_of(value));
        }
    }

    details
}
