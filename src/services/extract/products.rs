// src/services/extract/products.rs

//! Supported-product listing layouts.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use super::Item;
use super::markup::{Matcher, link_url, non_empty, selector, text};
use crate::error::ExtractionError;
use crate::models::ProductListing;

pub(super) const VARIANTS: &[(&str, Matcher)] = &[
    ("supported_products", supported_products),
    ("category_grid", category_grid),
    ("product_table", product_table),
];

/// Collects listings, keeping the first occurrence of each URL.
struct Listings {
    seen: HashSet<String>,
    items: Vec<Item>,
}

impl Listings {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, page_url: &str, anchor: ElementRef<'_>, category: Option<String>) {
        let Some(name) = non_empty(text(anchor)) else {
            return;
        };
        let Some(url) = link_url(page_url, anchor) else {
            return;
        };
        if self.seen.insert(url.clone()) {
            self.items.push(Item::Product(ProductListing {
                name,
                url,
                category,
            }));
        }
    }
}

/// `#allSupportedProducts` on a product family page.
fn supported_products(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let container = selector("#allSupportedProducts")?;
    let Some(section) = document.select(&container).next() else {
        return Ok(None);
    };
    let anchor = selector("a")?;

    let mut listings = Listings::new();
    for link in section.select(&anchor) {
        listings.push(page_url, link, None);
    }
    Ok(Some(listings.items))
}

/// The support index "Products by Category" block; headings name the category.
fn category_grid(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let container = selector(r#"div[data-config-metrics-title="Products by Category"]"#)?;
    let Some(section) = document.select(&container).next() else {
        return Ok(None);
    };
    let walk = selector("h2, h3, h4, a")?;

    let mut listings = Listings::new();
    let mut category = None;
    for element in section.select(&walk) {
        if element.value().name() == "a" {
            listings.push(page_url, element, category.clone());
        } else {
            category = non_empty(text(element));
        }
    }
    Ok(Some(listings.items))
}

/// `table.product-listing`; rows may carry `data-category`.
fn product_table(document: &Html, page_url: &str) -> Result<Option<Vec<Item>>, ExtractionError> {
    let table_sel = selector("table.product-listing")?;
    let Some(table) = document.select(&table_sel).next() else {
        return Ok(None);
    };
    let row_sel = selector("tr")?;
    let anchor = selector("td a")?;

    let mut listings = Listings::new();
    for row in table.select(&row_sel) {
        let category = row
            .value()
            .attr("data-category")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        for link in row.select(&anchor) {
            listings.push(page_url, link, category.clone());
        }
    }
    Ok(Some(listings.items))
}
