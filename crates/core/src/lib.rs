//! Core types and shared functionality for mathsvg.
//!
//! This crate provides:
//! - Tiered cache (sharded local tier, optional Redis tier)
//! - Formula fingerprinting
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStats, Fingerprint, HitLevel, TieredCache, fingerprint};
pub use config::{AppConfig, CacheConfig, ConfigError};
pub use error::Error;
