pub mod detail;
pub mod listing;

use scraper::ElementRef;

/// Concatenated, trimmed text content of an element.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
