// src/models/lifecycle.rs

//! EOL/EOS milestones, field notices and product listings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::utils::normalize_whitespace;

/// Software trains recognized by the software-scoped queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoftwareType {
    #[serde(rename = "IOS")]
    Ios,
    #[serde(rename = "IOS XE")]
    IosXe,
}

impl SoftwareType {
    pub const ALL: [SoftwareType; 2] = [SoftwareType::Ios, SoftwareType::IosXe];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoftwareType::Ios => "IOS",
            SoftwareType::IosXe => "IOS XE",
        }
    }

    /// Case- and separator-insensitive comparison with a scraped label.
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_whitespace(label).replace(['_', '-'], " ");
        self.as_str().eq_ignore_ascii_case(&label)
    }
}

impl fmt::Display for SoftwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoftwareType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoftwareType::ALL
            .into_iter()
            .find(|t| t.matches(s))
            .ok_or_else(|| AppError::validation(format!("unknown software type '{s}'")))
    }
}

/// The (software_type, software_version) a record was collected for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoftwareScope {
    pub software_type: String,
    pub software_version: String,
}

impl SoftwareScope {
    /// Build a scope from crawl filter parameters, if both keys are present.
    pub fn from_filters(filters: &BTreeMap<String, String>) -> Option<Self> {
        let software_type = filters.get("software_type")?.trim();
        let software_version = filters.get("software_version")?.trim();
        if software_type.is_empty() || software_version.is_empty() {
            return None;
        }
        Some(Self {
            software_type: software_type.to_string(),
            software_version: software_version.to_string(),
        })
    }
}

impl fmt::Display for SoftwareScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.software_type, self.software_version)
    }
}

/// End-of-life milestones for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolRecord {
    pub product_id: String,

    /// Milestone key → normalized date (`YYYY-MM-DD` when parseable)
    #[serde(default)]
    pub milestones: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulletin_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Set when collected through a software-scoped query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<SoftwareScope>,
}

impl EolRecord {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            milestones: BTreeMap::new(),
            bulletin_id: None,
            description: None,
            url: None,
            software: None,
        }
    }
}

/// A vendor advisory about a hardware product or a software version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNotice {
    pub notice_id: String,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<SoftwareScope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workaround: Option<bool>,

    /// Summary part of a "FN - id - summary - status" title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_short: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_symptom: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<Revision>,
}

/// One row of a field notice's revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl FieldNotice {
    pub fn new(notice_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            notice_id: notice_id.into(),
            title: title.into(),
            url: None,
            product_id: None,
            software: None,
            updated: None,
            workaround: None,
            description_short: None,
            background: None,
            problem_description: None,
            problem_symptom: None,
            revisions: Vec::new(),
        }
    }
}

/// A supported product as listed on the vendor's support index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_type_matching() {
        assert!(SoftwareType::IosXe.matches("ios-xe"));
        assert!(SoftwareType::IosXe.matches("IOS  XE"));
        assert!(!SoftwareType::Ios.matches("IOS XE"));
        assert_eq!("ios".parse::<SoftwareType>().unwrap(), SoftwareType::Ios);
        assert!("NX-OS".parse::<SoftwareType>().is_err());
    }

    #[test]
    fn test_scope_requires_both_filters() {
        let mut filters = BTreeMap::new();
        filters.insert("software_type".to_string(), "IOS".to_string());
        assert!(SoftwareScope::from_filters(&filters).is_none());

        filters.insert("software_version".to_string(), "15.1".to_string());
        let scope = SoftwareScope::from_filters(&filters).unwrap();
        assert_eq!(scope.to_string(), "IOS 15.1");
    }
}
