// src/services/extract/markup.rs

//! Shared machinery for HTML sources.

use scraper::{ElementRef, Html, Selector};

use super::{ExtractedPage, Item, eol, notices, products};
use crate::error::ExtractionError;
use crate::models::SourceKind;
use crate::utils::{label_key, normalize_whitespace, resolve};

/// A layout variant: `Ok(None)` when its anchors are absent.
pub(super) type Matcher = fn(&Html, &str) -> Result<Option<Vec<Item>>, ExtractionError>;

pub(super) type VariantTable = &'static [(&'static str, Matcher)];

fn table(kind: SourceKind) -> VariantTable {
    match kind {
        SourceKind::EolPage => eol::VARIANTS,
        SourceKind::FieldNoticePage => notices::VARIANTS,
        SourceKind::ProductListing => products::VARIANTS,
        SourceKind::PlatformList | SourceKind::ReleaseList | SourceKind::FeatureList => &[],
    }
}

pub(super) fn variant_names(kind: SourceKind) -> Vec<&'static str> {
    table(kind).iter().map(|(name, _)| *name).collect()
}

pub(super) fn extract(
    raw: &str,
    kind: SourceKind,
    page_url: &str,
) -> Result<ExtractedPage, ExtractionError> {
    let document = Html::parse_document(raw);

    for (variant, matcher) in table(kind) {
        if let Some(found) = matcher(&document, page_url)? {
            let mut items = Vec::with_capacity(found.len());
            let mut details: Vec<String> = Vec::new();
            for item in found {
                match item {
                    Item::DetailLink(url) => {
                        if !details.contains(&url) {
                            details.push(url);
                        }
                    }
                    other => items.push(other),
                }
            }
            return Ok(ExtractedPage {
                variant: *variant,
                items,
                details,
                has_next: Some(has_next_link(&document)?),
            });
        }
    }
    Err(ExtractionError::NoStructuralMatch { kind })
}

const NEXT_LINK: &str = r#"a[rel="next"], link[rel="next"], li.next a, a.next, .pagination .next a"#;

fn has_next_link(document: &Html) -> Result<bool, ExtractionError> {
    let next = selector(NEXT_LINK)?;
    Ok(document.select(&next).next().is_some())
}

/// Parse a CSS selector.
pub(super) fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Whitespace-normalized text content of an element.
pub(super) fn text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub(super) fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

/// Text of the first element matching `css` in the document.
pub(super) fn first_text(document: &Html, css: &str) -> Result<Option<String>, ExtractionError> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next().map(text).and_then(non_empty))
}

/// Resolve an anchor's href against the page, skipping in-page links.
pub(super) fn link_url(page_url: &str, anchor: ElementRef<'_>) -> Option<String> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    Some(resolve(page_url, href).unwrap_or_else(|| href.to_string()))
}

/// Header labels of a table as snake_case keys.
pub(super) fn header_keys(table: ElementRef<'_>) -> Result<Vec<String>, ExtractionError> {
    let th = selector("th")?;
    Ok(table.select(&th).map(|cell| label_key(&text(cell))).collect())
}

/// Data rows of a table: rows that contain at least one `td`.
pub(super) fn data_rows(table: ElementRef<'_>) -> Result<Vec<Vec<ElementRef<'_>>>, ExtractionError> {
    let tr = selector("tr")?;
    let td = selector("td")?;
    Ok(table
        .select(&tr)
        .map(|row| row.select(&td).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect())
}

/// Index of the first header whose key contains one of `needles`.
pub(super) fn column(headers: &[String], needles: &[&str]) -> Option<usize> {
    needles
        .iter()
        .find_map(|needle| headers.iter().position(|h| h.contains(needle)))
}

/// Label fragments (as snake_case) mapped to canonical milestone keys.
/// Order matters: the first fragment contained in the label wins.
const MILESTONES: &[(&str, &str)] = &[
    ("end_of_life_announcement", "end_of_life_announcement"),
    ("end_of_sale", "end_of_sale"),
    ("last_ship", "last_ship"),
    ("end_of_sw_maintenance", "end_of_sw_maintenance"),
    ("end_of_software_maintenance", "end_of_sw_maintenance"),
    ("end_of_vulnerability", "end_of_security_support"),
    ("end_of_security", "end_of_security_support"),
    ("end_of_new_service", "end_of_new_service_attachment"),
    ("end_of_service_contract_renewal", "end_of_service_contract_renewal"),
    ("end_of_routine_failure_analysis", "end_of_routine_failure_analysis"),
    ("last_date_of_support", "last_date_of_support"),
    ("series_release", "series_release"),
    ("end_of_support", "end_of_support"),
];

/// Canonical milestone key for a scraped label, if it names one.
pub(super) fn milestone_key(label: &str) -> Option<&'static str> {
    let key = label_key(label);
    MILESTONES
        .iter()
        .find(|(fragment, _)| key.contains(fragment))
        .map(|(_, canonical)| *canonical)
}

/// First run of ASCII digits, e.g. the number in "FN - 70123".
pub(super) fn first_digits(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}
