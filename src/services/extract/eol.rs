// src/services/extract/eol.rs

//! EOL/EOS page layouts.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use super::Item;
use super::markup::{
    Matcher, column, data_rows, first_text, header_keys, link_url, milestone_key, non_empty,
    selector, text,
};
use crate::error::ExtractionError;
use crate::models::EolRecord;
use crate::utils::{label_key, normalize_date, normalize_whitespace};

pub(super) const VARIANTS: &[(&str, Matcher)] = &[
    ("eol_listing_table", listing_table),
    ("eol_bulletin", bulletin),
    ("eol_cards", cards),
    ("eol_notice_links", notice_links),
];

/// Insert a milestone unless the label is unknown or the date empty.
/// The first occurrence of a milestone wins.
fn add_milestone(milestones: &mut BTreeMap<String, String>, label: &str, raw_date: &str) {
    let Some(key) = milestone_key(label) else {
        return;
    };
    let raw_date = normalize_whitespace(raw_date);
    if raw_date.is_empty() {
        return;
    }
    milestones
        .entry(key.to_string())
        .or_insert_with(|| normalize_date(&raw_date));
}

fn first_link(page_url: &str, cell: ElementRef<'_>) -> Result<Option<String>, ExtractionError> {
    let anchor = selector("a[href]")?;
    Ok(cell.select(&anchor).find_map(|a| link_url(page_url, a)))
}

/// `table.eol-listing`: one row per product, milestone columns by header.
fn listing_table(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let table_sel = selector("table.eol-listing")?;
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(None);
    };
    let headers = header_keys(table)?;
    let Some(product_col) = column(&headers, &["product_id", "part_number", "pid", "product"]) else {
        return Ok(None);
    };
    let bulletin_col = column(&headers, &["bulletin"]);
    let description_col = column(&headers, &["description"]);

    let mut items = Vec::new();
    for cells in data_rows(table)? {
        let Some(product_cell) = cells.get(product_col).copied() else {
            continue;
        };
        let Some(product_id) = non_empty(text(product_cell)) else {
            continue;
        };

        let mut record = EolRecord::new(product_id);
        for (idx, cell) in cells.iter().copied().enumerate() {
            let Some(header) = headers.get(idx) else {
                continue;
            };
            if idx == product_col {
                continue;
            } else if Some(idx) == bulletin_col {
                record.bulletin_id = non_empty(text(cell));
                record.url = first_link(page_url, cell)?;
            } else if Some(idx) == description_col {
                record.description = non_empty(text(cell));
            } else {
                add_milestone(&mut record.milestones, header, &text(cell));
            }
        }
        if record.url.is_none() {
            record.url = first_link(page_url, product_cell)?;
        }
        items.push(Item::Eol(record));
    }
    Ok(Some(items))
}

/// Bulletin page: id paragraph, milestone table, then affected-products table.
fn bulletin(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let Some(heading) = first_text(document, "p.pSubhead2CMT, p.pToC_Subhead2")? else {
        return Ok(None);
    };
    let bulletin_id = normalize_whitespace(&heading.replace(" - Amended", ""));
    let description = first_text(document, "p.pIntroCMT")?;

    let table_sel = selector("table")?;
    let th = selector("th")?;
    let tables: Vec<_> = document.select(&table_sel).collect();

    let mut milestones = BTreeMap::new();
    if let Some(table) = tables.first() {
        for cells in data_rows(*table)? {
            if cells.len() >= 3 {
                add_milestone(&mut milestones, &text(cells[0]), &text(cells[2]));
            }
        }
    }

    let mut items = Vec::new();
    if let Some(table) = tables.get(1) {
        let rows = data_rows(*table)?;
        // header row written with td cells when the table has no th
        let skip = usize::from(table.select(&th).next().is_none());
        for cells in rows.into_iter().skip(skip) {
            let Some(product_id) = non_empty(text(cells[0])) else {
                continue;
            };
            items.push(Item::Eol(EolRecord {
                product_id,
                milestones: milestones.clone(),
                bulletin_id: non_empty(bulletin_id.clone()),
                description: description.clone(),
                url: Some(page_url.to_string()),
                software: None,
            }));
        }
    }
    Ok(Some(items))
}

/// `div.eol-record[data-product-id]` cards with `dt`/`dd` pairs.
fn cards(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let card_sel = selector("div.eol-record[data-product-id]")?;
    let dt = selector("dt")?;
    let dd = selector("dd")?;

    let mut cards = document.select(&card_sel).peekable();
    if cards.peek().is_none() {
        return Ok(None);
    }

    let mut items = Vec::new();
    for card in cards {
        let product_id = card
            .value()
            .attr("data-product-id")
            .map(normalize_whitespace)
            .unwrap_or_default();
        if product_id.is_empty() {
            continue;
        }

        let mut record = EolRecord::new(product_id);
        for (label, value) in card.select(&dt).zip(card.select(&dd)) {
            let label = text(label);
            let key = label_key(&label);
            if key.contains("bulletin") {
                record.bulletin_id = non_empty(text(value));
            } else if key.contains("description") {
                record.description = non_empty(text(value));
            } else {
                add_milestone(&mut record.milestones, &label, &text(value));
            }
        }
        record.url = first_link(page_url, card)?;
        items.push(Item::Eol(record));
    }
    Ok(Some(items))
}

/// Notice listing page: links to individual `*eol.html` bulletins.
fn notice_links(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let anchor = selector("a[href]")?;
    let links: Vec<Item> = document
        .select(&anchor)
        .filter(|a| a.value().attr("href").is_some_and(|href| href.contains("eol.html")))
        .filter_map(|a| link_url(page_url, a))
        .map(Item::DetailLink)
        .collect();
    Ok((!links.is_empty()).then_some(links))
}
