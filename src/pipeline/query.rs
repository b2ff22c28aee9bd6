// src/pipeline/query.rs

//! Read-only paginated queries over the latest committed snapshots.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{DatasetType, PlatformType, Record, SoftwareScope, SoftwareType};
use crate::storage::DatasetStore;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 1000;

/// A filtered view of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetQuery {
    Platforms {
        by_name: Option<String>,
        platform_type: Option<PlatformType>,
    },
    Releases {
        platform_id: String,
    },
    Features {
        platform_id: String,
        release_id: String,
    },
    FieldNoticesByHardware {
        product_id: String,
    },
    FieldNoticesBySoftware {
        software_type: SoftwareType,
        software_version: String,
    },
    EolByHardware {
        product_id: String,
    },
    EolBySoftware {
        software_type: SoftwareType,
        software_version: String,
    },
}

fn required(filters: &BTreeMap<String, String>, key: &str) -> Result<String> {
    filters
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(format!("filter '{key}' is required")))
}

fn scope_matches(scope: Option<&SoftwareScope>, software_type: SoftwareType, version: &str) -> bool {
    scope.is_some_and(|s| {
        software_type.matches(&s.software_type) && s.software_version.trim() == version
    })
}

impl DatasetQuery {
    /// Build a query from a listing name and `key=value` filters.
    ///
    /// Field notice and EOL listings pick the software variant when
    /// `software_type` is given and the hardware variant otherwise.
    pub fn parse(listing: &str, filters: &BTreeMap<String, String>) -> Result<Self> {
        let listing = listing.trim().replace('-', "_").to_lowercase();
        let by_software = filters.contains_key("software_type");
        let query = match listing.as_str() {
            "platforms" => DatasetQuery::Platforms {
                by_name: filters.get("by_name").cloned(),
                platform_type: filters
                    .get("platform_type")
                    .map(|t| t.parse())
                    .transpose()?,
            },
            "releases" => DatasetQuery::Releases {
                platform_id: required(filters, "platform_id")?,
            },
            "features" => DatasetQuery::Features {
                platform_id: required(filters, "platform_id")?,
                release_id: required(filters, "release_id")?,
            },
            "field_notices" if by_software => DatasetQuery::FieldNoticesBySoftware {
                software_type: required(filters, "software_type")?.parse()?,
                software_version: required(filters, "software_version")?,
            },
            "field_notices" => DatasetQuery::FieldNoticesByHardware {
                product_id: required(filters, "product_id")?,
            },
            "eol" if by_software => DatasetQuery::EolBySoftware {
                software_type: required(filters, "software_type")?.parse()?,
                software_version: required(filters, "software_version")?,
            },
            "eol" => DatasetQuery::EolByHardware {
                product_id: required(filters, "product_id")?,
            },
            other => return Err(AppError::validation(format!("unknown listing '{other}'"))),
        };
        query.validate()?;
        Ok(query)
    }

    /// Dataset the query reads.
    pub fn dataset(&self) -> DatasetType {
        match self {
            DatasetQuery::Platforms { .. }
            | DatasetQuery::Releases { .. }
            | DatasetQuery::Features { .. } => DatasetType::Features,
            DatasetQuery::FieldNoticesByHardware { .. }
            | DatasetQuery::FieldNoticesBySoftware { .. } => DatasetType::FieldNotices,
            DatasetQuery::EolByHardware { .. } | DatasetQuery::EolBySoftware { .. } => {
                DatasetType::Eol
            }
        }
    }

    /// Reject required filters that are blank.
    pub fn validate(&self) -> Result<()> {
        let blank = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(AppError::validation(format!("filter '{field}' is required")))
            } else {
                Ok(())
            }
        };
        match self {
            DatasetQuery::Platforms { .. } => Ok(()),
            DatasetQuery::Releases { platform_id } => blank("platform_id", platform_id),
            DatasetQuery::Features {
                platform_id,
                release_id,
            } => {
                blank("platform_id", platform_id)?;
                blank("release_id", release_id)
            }
            DatasetQuery::FieldNoticesByHardware { product_id }
            | DatasetQuery::EolByHardware { product_id } => blank("product_id", product_id),
            DatasetQuery::FieldNoticesBySoftware {
                software_version, ..
            }
            | DatasetQuery::EolBySoftware {
                software_version, ..
            } => blank("software_version", software_version),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (
                DatasetQuery::Platforms {
                    by_name,
                    platform_type,
                },
                Record::Platform(p),
            ) => {
                let name_ok = by_name.as_deref().is_none_or(|needle| {
                    p.name.to_lowercase().contains(&needle.trim().to_lowercase())
                });
                name_ok && platform_type.is_none_or(|t| t == p.platform_type)
            }
            (DatasetQuery::Releases { platform_id }, Record::Release(r)) => {
                r.platform_id == platform_id.trim()
            }
            (
                DatasetQuery::Features {
                    platform_id,
                    release_id,
                },
                Record::Feature(f),
            ) => f.platform_id == platform_id.trim() && f.release_id == release_id.trim(),
            (DatasetQuery::FieldNoticesByHardware { product_id }, Record::FieldNotice(n)) => n
                .product_id
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(product_id.trim())),
            (
                DatasetQuery::FieldNoticesBySoftware {
                    software_type,
                    software_version,
                },
                Record::FieldNotice(n),
            ) => scope_matches(n.software.as_ref(), *software_type, software_version.trim()),
            (DatasetQuery::EolByHardware { product_id }, Record::Eol(e)) => {
                e.product_id.eq_ignore_ascii_case(product_id.trim())
            }
            (
                DatasetQuery::EolBySoftware {
                    software_type,
                    software_version,
                },
                Record::Eol(e),
            ) => scope_matches(e.software.as_ref(), *software_type, software_version.trim()),
            _ => false,
        }
    }
}

/// Page number and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page < 1 {
            return Err(AppError::validation("page must be >= 1"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self { page, limit })
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub page: u32,
    pub limit: u32,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_more: bool,
    /// Snapshot version the page was cut from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// List matching records of the latest snapshot, in natural-key order.
pub async fn list(
    store: &dyn DatasetStore,
    query: &DatasetQuery,
    pagination: Pagination,
) -> Result<Page> {
    query.validate()?;
    let pagination = Pagination::new(pagination.page, pagination.limit)?;

    let snapshot = store.read(query.dataset()).await?;
    let matching: Vec<&Record> = snapshot
        .as_deref()
        .map(|s| s.records.iter().filter(|r| query.matches(r)).collect())
        .unwrap_or_default();

    let total_items = matching.len();
    let total_pages = total_items.div_ceil(pagination.limit as usize);
    let items = matching
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.limit as usize)
        .cloned()
        .collect();

    Ok(Page {
        items,
        page: pagination.page,
        limit: pagination.limit,
        total_items,
        total_pages,
        has_more: (pagination.page as usize) < total_pages,
        version: snapshot.map(|s| s.version()),
    })
}
