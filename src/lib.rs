//! mise-s3-cache - Object-storage cache for mise tool installations
//!
//! Restores tool installs from S3 (or a shared directory) instead of
//! downloading them from upstream, and uploads fresh installs for the next
//! machine.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod mise;
pub mod project;
pub mod storage;
pub mod ui;

pub use error::{CacheError, CacheResult};
