// src/lib.rs

//! Lifecycle Crawler Library
//!
//! Crawls public network-equipment lifecycle data (feature catalogs, EOL
//! milestones, field notices, product listings) and keeps each dataset as a
//! versioned, checksum-validated snapshot.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
