// src/services/staging.rs

//! Per-run staging buffer keyed by natural key.

use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::models::Record;

/// Records collected by one crawl run, private to that run until commit.
#[derive(Debug, Default)]
pub struct Staging {
    records: BTreeMap<String, Record>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record.
    ///
    /// A key seen before with identical content is coalesced. The same key
    /// with different content is an integrity fault and leaves the buffer
    /// unchanged.
    pub fn insert(&mut self, record: Record) -> Result<()> {
        let key = record.natural_key();
        match self.records.get(&key) {
            Some(existing) if *existing == record => Ok(()),
            Some(_) => {
                log::error!("Integrity fault: {} staged twice with different content", key);
                Err(AppError::integrity(key, "same key staged with different content"))
            }
            None => {
                self.records.insert(key, record);
                Ok(())
            }
        }
    }

    /// Fold another buffer into this one under the same rule.
    pub fn merge(&mut self, other: Staging) -> Result<()> {
        for record in other.records.into_values() {
            self.insert(record)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by natural key.
    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}
