// src/services/extract/mod.rs

//! Payload → record extraction.
//!
//! Each [`SourceKind`] has a fixed, priority-ordered table of layout
//! variants. The first variant whose structural anchors are present in the
//! payload wins; missing optional fields inside a matched variant become
//! `None`. Only a payload that no variant recognizes is an error.
//!
//! Extraction is pure: the same payload, kind and page URL always produce
//! the same [`ExtractedPage`].

mod api;
mod eol;
mod markup;
mod notices;
mod products;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::models::{EolRecord, FieldNotice, ProductListing, Record, SourceKind};

/// A platform row from the platform listing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub id: String,
    pub name: String,
}

/// A release row from the release listing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub id: String,
    pub version: String,
}

/// A feature row from the feature listing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub name: String,
    pub description: Option<String>,
    pub feature_set: Option<String>,
}

/// One extracted entry, typed by source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Platform(PlatformEntry),
    Release(ReleaseEntry),
    Feature(FeatureEntry),
    Eol(EolRecord),
    FieldNotice(FieldNotice),
    Product(ProductListing),
    /// Absolute URL of a detail page (bulletin, notice) linked from a listing
    DetailLink(String),
}

impl Item {
    /// Convert a self-contained entry into a record.
    ///
    /// Catalog entries need their parent ids and are assembled by the
    /// hierarchical crawler instead.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Item::Eol(e) => Some(Record::Eol(e)),
            Item::FieldNotice(n) => Some(Record::FieldNotice(n)),
            Item::Product(p) => Some(Record::Product(p)),
            Item::Platform(_) | Item::Release(_) | Item::Feature(_) | Item::DetailLink(_) => None,
        }
    }
}

/// The result of extracting one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Name of the layout variant that matched
    pub variant: &'static str,
    pub items: Vec<Item>,
    /// Detail pages linked from this page, in document order, deduplicated
    pub details: Vec<String>,
    /// Next-page link presence for markup; `None` for API payloads,
    /// which terminate on an empty page
    pub has_next: Option<bool>,
}

impl ExtractedPage {
    /// No entries and no detail links: the listing has run out.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.details.is_empty()
    }
}

/// Stateless extractor over every known source layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the entries of one raw payload.
    ///
    /// `page_url` is the URL the payload was fetched from; markup links are
    /// resolved against it.
    pub fn extract(
        &self,
        raw: &str,
        kind: SourceKind,
        page_url: &str,
    ) -> Result<ExtractedPage, ExtractionError> {
        if kind.is_markup() {
            markup::extract(raw, kind, page_url)
        } else {
            api::extract(raw, kind)
        }
    }

    /// Variant names for a source kind, in priority order.
    pub fn variants(kind: SourceKind) -> Vec<&'static str> {
        if kind.is_markup() {
            markup::variant_names(kind)
        } else {
            api::variant_names()
        }
    }
}
