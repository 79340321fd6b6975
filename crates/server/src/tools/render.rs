//! render_formula tool implementation.
//!
//! Validates a TeX formula and returns its SVG, from cache when possible.

use mathsvg_core::{Error, HitLevel};
use mathsvg_render::{FALLBACK_SVG, FormulaService};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for the render_formula tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderFormulaParams {
    /// TeX source of the formula. Surrounding whitespace is ignored.
    pub tex: String,
}

/// Output of a successful render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderFormulaOutput {
    /// Complete SVG document.
    pub svg: String,
    /// SHA-256 hex of the normalized formula.
    pub fingerprint: String,
    /// Where the SVG came from: "miss" (freshly rendered), "local" or "remote".
    pub cache_hit_level: HitLevel,
    pub render_duration_ms: f64,
    pub request_duration_ms: f64,
}

/// Output when the formula is rejected or fails to render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderFormulaFailure {
    /// Code-prefixed error message.
    pub error: String,
    /// Placeholder image clients can display instead.
    pub svg: String,
}

/// Implementation of the render_formula tool.
///
/// Input and render failures are reported as tool errors carrying the
/// fallback SVG; anything else is a protocol error.
pub async fn render_impl(service: &FormulaService, params: RenderFormulaParams) -> Result<CallToolResult, McpError> {
    match service.render(&params.tex).await {
        Ok(outcome) => {
            let output = RenderFormulaOutput {
                svg: outcome.svg,
                fingerprint: outcome.fingerprint.to_string(),
                cache_hit_level: outcome.hit_level,
                render_duration_ms: outcome.render_duration.as_secs_f64() * 1000.0,
                request_duration_ms: outcome.total_duration.as_secs_f64() * 1000.0,
            };
            Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&output).unwrap_or_default(),
            )]))
        }
        Err(e) if e.is_invalid_input() || matches!(e, Error::RenderFailed(_)) => {
            if e.is_invalid_input() {
                tracing::warn!(error = %e, "formula rejected");
            }
            let failure = RenderFormulaFailure { error: e.to_string(), svg: FALLBACK_SVG.to_string() };
            Ok(CallToolResult::error(vec![Content::text(
                serde_json::to_string_pretty(&failure).unwrap_or_default(),
            )]))
        }
        Err(e) => Err(e.into()),
    }
}
