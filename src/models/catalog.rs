// src/models/catalog.rs

//! Platform, release and feature catalog records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::utils::normalize_whitespace;

/// Platform family as named by the upstream catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlatformType {
    Switches,
    Routers,
    Wireless,
    #[serde(rename = "IOT Routers")]
    IotRouters,
    #[serde(rename = "IOT Switches")]
    IotSwitches,
}

impl PlatformType {
    pub const ALL: [PlatformType; 5] = [
        PlatformType::Switches,
        PlatformType::Routers,
        PlatformType::Wireless,
        PlatformType::IotRouters,
        PlatformType::IotSwitches,
    ];

    /// Upstream `mdf_product_type` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Switches => "Switches",
            PlatformType::Routers => "Routers",
            PlatformType::Wireless => "Wireless",
            PlatformType::IotRouters => "IOT Routers",
            PlatformType::IotSwitches => "IOT Switches",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_whitespace(s).replace(['_', '-'], " ");
        PlatformType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| AppError::validation(format!("unknown platform type '{s}'")))
    }
}

/// A hardware platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub platform_type: PlatformType,
}

/// A software release available for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub platform_id: String,
    pub version: String,
}

/// A feature supported by a (platform, release) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Deterministic digest of (platform_id, release_id, normalized name)
    pub hash_id: String,
    pub platform_id: String,
    pub release_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Feature sets listing this feature, sorted and deduplicated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_sets: Vec<String>,
}

/// Separator between the digest inputs; never appears in ids or names.
const FIELD_SEPARATOR: u8 = 0x1f;

impl Feature {
    /// Normalized form of a feature name used for identity.
    pub fn normalize_name(name: &str) -> String {
        normalize_whitespace(name).to_lowercase()
    }

    /// Compute the feature identifier.
    ///
    /// The same inputs always produce the same id, across runs and processes.
    /// `digest_bytes` is clamped to the SHA-256 output length.
    pub fn hash_id(platform_id: &str, release_id: &str, name: &str, digest_bytes: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(platform_id.trim().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(release_id.trim().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(Self::normalize_name(name).as_bytes());
        let digest = hasher.finalize();
        let len = digest_bytes.clamp(1, digest.len());
        hex::encode(&digest[..len])
    }

    /// Fold another listing of the same feature into this one.
    ///
    /// Rows sharing a hash id may differ only in their feature set; a
    /// different name or description is an integrity fault.
    pub fn absorb(&mut self, other: Feature) -> Result<(), AppError> {
        if other.hash_id != self.hash_id
            || other.name != self.name
            || (other.description.is_some() && self.description.is_some() && other.description != self.description)
        {
            return Err(AppError::integrity(
                format!("feature:{}:{}:{}", self.platform_id, self.release_id, self.hash_id),
                format!("hash_id shared by '{}' and '{}' with different content", self.name, other.name),
            ));
        }
        if self.description.is_none() {
            self.description = other.description;
        }
        for set in other.feature_sets {
            if let Err(pos) = self.feature_sets.binary_search(&set) {
                self.feature_sets.insert(pos, set);
            }
        }
        Ok(())
    }

    /// Whether `hash_id` has the shape produced by [`Feature::hash_id`].
    pub fn is_valid_hash(hash_id: &str) -> bool {
        !hash_id.is_empty()
            && hash_id.len() % 2 == 0
            && hash_id.len() <= 64
            && hash_id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}
