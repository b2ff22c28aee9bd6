// src/services/extract/notices.rs

//! Field notice page layouts.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::Item;
use super::markup::{
    Matcher, column, data_rows, first_digits, first_text, header_keys, link_url, non_empty,
    selector, text,
};
use crate::error::ExtractionError;
use crate::models::{FieldNotice, Revision};
use crate::utils::{normalize_date, normalize_whitespace};

pub(super) const VARIANTS: &[(&str, Matcher)] = &[
    ("fn_listing_table", listing_table),
    ("fn_detail", detail),
    ("fn_link_list", link_list),
    ("fn_notice_links", notice_links),
];

static UPDATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Updated:\s*([A-Za-z]+ \d{1,2}, \d{4})").expect("updated-date pattern is valid")
});

/// Titles shaped "FN - <id> - <summary> - <workaround status>" carry the
/// workaround flag in their fourth part.
pub(crate) fn workaround_from_title(title: &str) -> Option<bool> {
    let parts: Vec<&str> = title.split(" - ").collect();
    (parts.len() == 4).then(|| parts[3].trim() == "Workaround Provided")
}

/// The summary part of a four-part title.
fn summary_from_title(title: &str) -> Option<String> {
    let parts: Vec<&str> = title.split(" - ").collect();
    (parts.len() == 4)
        .then(|| normalize_whitespace(parts[2]))
        .and_then(non_empty)
}

fn any_link(page_url: &str, cells: &[ElementRef<'_>]) -> Result<Option<String>, ExtractionError> {
    let anchor = selector("a[href]")?;
    Ok(cells
        .iter()
        .flat_map(|cell| cell.select(&anchor))
        .find_map(|a| link_url(page_url, a)))
}

/// `table.fn-listing`: one row per notice (and product, when listed).
fn listing_table(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let table_sel = selector("table.fn-listing")?;
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(None);
    };
    let headers = header_keys(table)?;
    let id_col = column(&headers, &["notice", "fn", "id"]);
    let title_col = column(&headers, &["title", "headline"]);
    if id_col.is_none() && title_col.is_none() {
        return Ok(None);
    }
    let product_col = column(&headers, &["product"]);
    let updated_col = column(&headers, &["updated", "date"]);

    let cell_text = |cells: &[ElementRef<'_>], col: Option<usize>| -> Option<String> {
        col.and_then(|c| cells.get(c)).map(|cell| text(*cell)).and_then(non_empty)
    };

    let mut items = Vec::new();
    for cells in data_rows(table)? {
        let id_text = cell_text(&cells, id_col);
        let title = cell_text(&cells, title_col);
        let Some(notice_id) = id_text
            .as_deref()
            .and_then(first_digits)
            .or_else(|| title.as_deref().and_then(first_digits))
        else {
            continue;
        };
        let Some(title) = title.or(id_text) else {
            continue;
        };

        let mut notice = FieldNotice::new(notice_id, title);
        notice.workaround = workaround_from_title(&notice.title);
        notice.product_id = cell_text(&cells, product_col);
        notice.updated = cell_text(&cells, updated_col).map(|d| normalize_date(&d));
        notice.url = any_link(page_url, &cells)?;
        items.push(Item::FieldNotice(notice));
    }
    Ok(Some(items))
}

/// `Updated: <Month D, YYYY>` inside the `.updatedDate` block.
fn updated_date(document: &Html) -> Result<Option<String>, ExtractionError> {
    let Some(block) = first_text(document, ".updatedDate")? else {
        return Ok(None);
    };
    Ok(UPDATED
        .captures(&block)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_date(m.as_str())))
}

/// Paragraphs between the `heading` h3 and the next h3, in document order.
fn section(document: &Html, heading: &str) -> Result<Vec<String>, ExtractionError> {
    let walk = selector("h3, p")?;
    let mut inside = false;
    let mut paragraphs = Vec::new();
    for element in document.select(&walk) {
        match element.value().name() {
            "h3" if inside => break,
            "h3" => inside = text(element).eq_ignore_ascii_case(heading),
            "p" if inside => paragraphs.extend(non_empty(text(element))),
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn section_text(document: &Html, heading: &str) -> Result<Option<String>, ExtractionError> {
    Ok(non_empty(section(document, heading)?.join("\n")))
}

/// Rows of the bordered revision-history table.
fn revisions(document: &Html) -> Result<Vec<Revision>, ExtractionError> {
    let table_sel = selector(r#"table[border="1"]"#)?;
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };
    let th = selector("th")?;
    let skip = usize::from(table.select(&th).next().is_none());

    let cell = |cells: &[ElementRef<'_>], idx: usize| cells.get(idx).map(|c| text(*c)).and_then(non_empty);
    Ok(data_rows(table)?
        .into_iter()
        .skip(skip)
        .filter_map(|cells| {
            Some(Revision {
                revision: cell(&cells, 0)?,
                published: cell(&cells, 1).map(|d| normalize_date(&d)),
                comments: cell(&cells, 2),
            })
        })
        .collect())
}

/// The first table after the "Products Affected" heading.
fn products_affected_table(document: &Html) -> Result<Option<ElementRef<'_>>, ExtractionError> {
    let walk = selector("h3, table")?;
    let mut after_heading = false;
    for element in document.select(&walk) {
        match element.value().name() {
            "h3" => after_heading = text(element).eq_ignore_ascii_case("Products Affected"),
            "table" if after_heading => return Ok(Some(element)),
            _ => {}
        }
    }
    Ok(None)
}

/// Single notice page titled by `#fw-pagetitle`.
fn detail(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let Some(title) = first_text(document, "#fw-pagetitle")? else {
        return Ok(None);
    };
    let Some(notice_id) = first_digits(&title)
        .or(first_text(document, ".documentId")?.as_deref().and_then(first_digits))
    else {
        return Ok(Some(Vec::new()));
    };

    let mut notice = FieldNotice::new(notice_id, title);
    notice.workaround = workaround_from_title(&notice.title);
    notice.description_short = summary_from_title(&notice.title);
    notice.updated = updated_date(document)?;
    notice.url = Some(page_url.to_string());
    notice.background = section(document, "Background")?.into_iter().next();
    notice.problem_description = section_text(document, "Problem Description")?;
    notice.problem_symptom = section_text(document, "Problem Symptom")?;
    notice.revisions = revisions(document)?;

    let mut items = Vec::new();
    if let Some(table) = products_affected_table(document)? {
        let headers = header_keys(table)?;
        let product_col =
            column(&headers, &["affected_product", "product_id", "product"]).unwrap_or(0);
        let th = selector("th")?;
        let skip = usize::from(table.select(&th).next().is_none());
        for cells in data_rows(table)?.into_iter().skip(skip) {
            let Some(product) = cells.get(product_col).map(|c| text(*c)).and_then(non_empty) else {
                continue;
            };
            let mut affected = notice.clone();
            affected.product_id = Some(product);
            items.push(Item::FieldNotice(affected));
        }
    }
    if items.is_empty() {
        items.push(Item::FieldNotice(notice));
    }
    Ok(Some(items))
}

/// `ul.fn-list` of links to individual notices.
fn link_list(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let list_sel = selector("ul.fn-list")?;
    if document.select(&list_sel).next().is_none() {
        return Ok(None);
    }
    let link_sel = selector("ul.fn-list li a")?;
    Ok(Some(
        document
            .select(&link_sel)
            .filter(|a| {
                first_digits(&text(*a)).is_some()
                    || a.value().attr("href").and_then(first_digits).is_some()
            })
            .filter_map(|a| link_url(page_url, a))
            .map(Item::DetailLink)
            .collect(),
    ))
}

/// Product notice list: any link into the `field-notices/` tree that
/// carries a notice number.
fn notice_links(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let anchor = selector("a[href]")?;
    let links: Vec<Item> = document
        .select(&anchor)
        .filter(|a| {
            a.value()
                .attr("href")
                .is_some_and(|href| href.contains("field-notices/") && first_digits(href).is_some())
        })
        .filter_map(|a| link_url(page_url, a))
        .map(Item::DetailLink)
        .collect();
    Ok((!links.is_empty()).then_some(links))
}
