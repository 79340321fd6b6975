//! cache_stats tool implementation.
//!
//! Reports cache counters, remote tier health and process uptime.

use chrono::{DateTime, Utc};
use mathsvg_core::{CacheStats, TieredCache};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsOutput {
    pub status: String,
    pub stats: CacheStats,
    /// ISO8601 timestamp of process start.
    pub started_at: String,
    pub uptime_secs: u64,
}

/// Implementation of the cache_stats tool.
pub fn stats_impl(
    cache: &TieredCache, started: Instant, started_at: DateTime<Utc>,
) -> Result<CallToolResult, McpError> {
    let output = CacheStatsOutput {
        status: "ok".into(),
        stats: cache.stats(),
        started_at: started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        uptime_secs: started.elapsed().as_secs(),
    };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::service;

    #[tokio::test]
    async fn test_stats_reflect_requests() {
        let service = service();
        service.render("a+b").await.unwrap();
        service.render("a+b").await.unwrap();
        service.render("c").await.unwrap();

        let result = stats_impl(service.cache(), Instant::now(), Utc::now()).unwrap();
        let text = result.content.first().and_then(|c| c.as_text()).unwrap();
        let output: CacheStatsOutput = serde_json::from_str(&text.text).unwrap();

        assert_eq!(output.status, "ok");
        assert_eq!(output.stats.misses, 2);
        assert_eq!(output.stats.hits_local, 1);
        assert_eq!(output.stats.hits_remote, 0);
        assert_eq!(output.stats.local_entries, 2);
        assert!(!output.stats.remote_enabled);
        assert!(!output.stats.remote_alive);
        assert!(output.started_at.ends_with('Z'));
    }
}
