//! Utility functions and helpers.

pub mod http;

use chrono::NaiveDate;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Collapse runs of whitespace (including NBSP) into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Date layouts seen on lifecycle pages, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%m/%d/%Y",
];

/// Normalize a scraped date to `YYYY-MM-DD`.
///
/// Unparseable text is returned whitespace-normalized rather than dropped,
/// so a milestone such as "TBD" survives into the snapshot.
pub fn normalize_date(text: &str) -> String {
    let cleaned = normalize_whitespace(text);
    parse_date(&cleaned)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or(cleaned)
}

/// Parse a date in any of the known layouts.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Turn a free-form label into a snake_case key.
///
/// `"End-of-Sale Date: HW"` becomes `"end_of_sale_date_hw"`.
pub fn label_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Catalyst\u{a0} 9300\n\t48P "), "Catalyst 9300 48P");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("October 31, 2015"), "2015-10-31");
        assert_eq!(normalize_date("31-Oct-2015"), "2015-10-31");
        assert_eq!(normalize_date("2015-10-31"), "2015-10-31");
        assert_eq!(normalize_date(" Oct  31, 2015 "), "2015-10-31");
    }

    #[test]
    fn test_normalize_date_keeps_unparseable_text() {
        assert_eq!(normalize_date(" TBD "), "TBD");
    }

    #[test]
    fn test_label_key() {
        assert_eq!(label_key("End-of-Sale Date: HW"), "end_of_sale_date_hw");
        assert_eq!(label_key("  Last Date of Support  "), "last_date_of_support");
    }
}
