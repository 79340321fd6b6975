//! MCP tool implementations.
//!
//! This module contains all tools exposed by the mathsvg server.

pub mod lookup;
pub mod render;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use lookup::{CacheGetParams, get_impl};
pub use render::{RenderFormulaParams, render_impl};
pub use stats::stats_impl;
