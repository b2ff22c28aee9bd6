// src/models/record.rs

//! Dataset kinds, source kinds, and the normalized record union.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{EolRecord, Feature, FieldNotice, Platform, ProductListing, Release};

/// A logical dataset committed as one snapshot series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Platform → release → feature catalog
    Features,
    /// EOL/EOS milestones
    Eol,
    /// Field/advisory notices
    FieldNotices,
    /// Supported product listings
    Products,
}

impl DatasetType {
    pub const ALL: [DatasetType; 4] = [
        DatasetType::Features,
        DatasetType::Eol,
        DatasetType::FieldNotices,
        DatasetType::Products,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Features => "features",
            DatasetType::Eol => "eol",
            DatasetType::FieldNotices => "field_notices",
            DatasetType::Products => "products",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_lowercase();
        DatasetType::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| AppError::validation(format!("unknown dataset '{s}'")))
    }
}

/// The logical upstream source a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PlatformList,
    ReleaseList,
    FeatureList,
    EolPage,
    FieldNoticePage,
    ProductListing,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PlatformList => "platform_list",
            SourceKind::ReleaseList => "release_list",
            SourceKind::FeatureList => "feature_list",
            SourceKind::EolPage => "eol_page",
            SourceKind::FieldNoticePage => "field_notice_page",
            SourceKind::ProductListing => "product_listing",
        }
    }

    /// Markup sources are HTML documents; the rest are JSON API responses.
    pub fn is_markup(&self) -> bool {
        matches!(
            self,
            SourceKind::EolPage | SourceKind::FieldNoticePage | SourceKind::ProductListing
        )
    }

    /// The dataset a flat source feeds, if any.
    pub fn dataset(&self) -> DatasetType {
        match self {
            SourceKind::PlatformList | SourceKind::ReleaseList | SourceKind::FeatureList => {
                DatasetType::Features
            }
            SourceKind::EolPage => DatasetType::Eol,
            SourceKind::FieldNoticePage => DatasetType::FieldNotices,
            SourceKind::ProductListing => DatasetType::Products,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized record as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Platform(Platform),
    Release(Release),
    Feature(Feature),
    Eol(EolRecord),
    FieldNotice(FieldNotice),
    Product(ProductListing),
}

impl Record {
    /// Externally meaningful unique key within a dataset.
    pub fn natural_key(&self) -> String {
        match self {
            Record::Platform(p) => format!("platform:{}", p.id),
            Record::Release(r) => format!("release:{}:{}", r.platform_id, r.id),
            Record::Feature(f) => format!("feature:{}:{}:{}", f.platform_id, f.release_id, f.hash_id),
            Record::Eol(e) => match &e.software {
                Some(scope) => format!(
                    "eol:{}/{}:{}",
                    scope.software_type, scope.software_version, e.product_id
                ),
                None => format!("eol:{}", e.product_id),
            },
            Record::FieldNotice(n) => match (&n.product_id, &n.software) {
                (Some(product), _) => format!("fn:{}:{}", n.notice_id, product),
                (None, Some(scope)) => format!(
                    "fn:{}:{}/{}",
                    n.notice_id, scope.software_type, scope.software_version
                ),
                (None, None) => format!("fn:{}", n.notice_id),
            },
            Record::Product(p) => format!("product:{}", p.url),
        }
    }

    /// Dataset this record belongs to.
    pub fn dataset(&self) -> DatasetType {
        match self {
            Record::Platform(_) | Record::Release(_) | Record::Feature(_) => DatasetType::Features,
            Record::Eol(_) => DatasetType::Eol,
            Record::FieldNotice(_) => DatasetType::FieldNotices,
            Record::Product(_) => DatasetType::Products,
        }
    }

    /// Check that required fields are present.
    pub fn check_shape(&self) -> Result<(), String> {
        fn required(field: &str, value: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("missing {field}"))
            } else {
                Ok(())
            }
        }

        match self {
            Record::Platform(p) => {
                required("platform id", &p.id)?;
                required("platform name", &p.name)
            }
            Record::Release(r) => {
                required("release id", &r.id)?;
                required("release platform_id", &r.platform_id)?;
                required("release version", &r.version)
            }
            Record::Feature(f) => {
                required("feature platform_id", &f.platform_id)?;
                required("feature release_id", &f.release_id)?;
                required("feature name", &f.name)?;
                if Feature::is_valid_hash(&f.hash_id) {
                    Ok(())
                } else {
                    Err(format!("malformed hash_id '{}'", f.hash_id))
                }
            }
            Record::Eol(e) => required("product_id", &e.product_id),
            Record::FieldNotice(n) => {
                required("notice_id", &n.notice_id)?;
                required("notice title", &n.title)
            }
            Record::Product(p) => {
                required("product name", &p.name)?;
                required("product url", &p.url)
            }
        }
    }
}
