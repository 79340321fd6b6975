//! cache_get tool implementation.
//!
//! Looks an SVG up by fingerprint without rendering.

use mathsvg_core::{Fingerprint, HitLevel, TieredCache};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Fingerprint returned by render_formula (64 lowercase hex characters).
    pub fingerprint: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub fingerprint: String,
    /// Cached SVG, absent on a miss.
    pub svg: Option<String>,
    pub cache_hit_level: HitLevel,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(
    cache: &TieredCache, params: CacheGetParams, budget: Duration,
) -> Result<CallToolResult, McpError> {
    let key = Fingerprint::parse(&params.fingerprint)?;
    let (svg, cache_hit_level) = cache.get(&key, tokio::time::Instant::now() + budget).await;

    let output = CacheGetOutput { fingerprint: key.to_string(), svg, cache_hit_level };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
