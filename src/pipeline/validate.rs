// src/pipeline/validate.rs

//! Structural validation of a record set before it becomes a snapshot.

use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::models::{DatasetType, Record};

/// Validate a record set sorted by natural key.
///
/// Checks that every record belongs to `dataset` and has its required
/// fields, that natural keys are unique, and, for the feature catalog, that
/// every release and feature points at a platform and release in the set.
pub fn validate_records(dataset: DatasetType, records: &[Record]) -> Result<()> {
    let mut previous_key: Option<String> = None;
    for record in records {
        if record.dataset() != dataset {
            return Err(AppError::commit_validation(format!(
                "{} record in a {} commit",
                record.dataset(),
                dataset
            )));
        }
        let key = record.natural_key();
        record
            .check_shape()
            .map_err(|reason| AppError::commit_validation(format!("{key}: {reason}")))?;
        if previous_key.as_deref() == Some(key.as_str()) {
            return Err(AppError::commit_validation(format!(
                "duplicate natural key {key}"
            )));
        }
        previous_key = Some(key);
    }

    if dataset == DatasetType::Features {
        check_catalog_references(records)?;
    }
    Ok(())
}

fn check_catalog_references(records: &[Record]) -> Result<()> {
    let platforms: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| match r {
            Record::Platform(p) => Some(p.id.as_str()),
            _ => None,
        })
        .collect();
    let releases: BTreeSet<(&str, &str)> = records
        .iter()
        .filter_map(|r| match r {
            Record::Release(r) => Some((r.platform_id.as_str(), r.id.as_str())),
            _ => None,
        })
        .collect();

    for record in records {
        match record {
            Record::Release(r) if !platforms.contains(r.platform_id.as_str()) => {
                return Err(AppError::commit_validation(format!(
                    "release {} references unknown platform {}",
                    r.id, r.platform_id
                )));
            }
            Record::Feature(f)
                if !releases.contains(&(f.platform_id.as_str(), f.release_id.as_str())) =>
            {
                return Err(AppError::commit_validation(format!(
                    "feature {} references unknown release {}/{}",
                    f.hash_id, f.platform_id, f.release_id
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
