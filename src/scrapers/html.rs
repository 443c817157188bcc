//! Small helpers over `scraper` shared by the site plugins and metadata providers.
//!
//! `scraper::Html` is not `Send`, so callers parse inside a plain function and
//! return owned values before the next `.await`.

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::error::ScrapeError;

/// Lazily compiled selector for a CSS literal written in code.
pub fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("Invalid selector defined in code"))
}

/// Selector built at runtime, e.g. with an attribute value spliced in.
pub fn parse_selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::UpstreamLogicMismatch(format!("Bad selector {css}: {e}")))
}

#[must_use]
pub fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Text content of an element, trimmed.
#[must_use]
pub fn text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[must_use]
pub fn child_attr(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
}

#[must_use]
pub fn child_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    static LINK: OnceLock<Selector> = OnceLock::new();

    #[test]
    fn test_helpers() {
        let doc = Html::parse_document(
            r#"<ul><li><a href=" /a " title="A">  First </a></li><li><a href="/b">Second</a></li></ul>"#,
        );
        let link = selector(&LINK, "li > a");

        assert_eq!(first_attr(&doc, link, "href").as_deref(), Some("/a"));
        assert_eq!(first_attr(&doc, link, "data-missing"), None);

        let li = parse_selector("li").unwrap();
        let first = doc.select(&li).next().unwrap();
        assert_eq!(child_text(first, link).as_deref(), Some("First"));
        assert_eq!(child_attr(first, link, "title").as_deref(), Some("A"));

        assert!(parse_selector("li >>> ").is_err());
    }
}
