//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mathsvg_render::FormulaService;

use crate::tools::{CacheGetParams, RenderFormulaParams, get_impl, render_impl, stats_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for mathsvg.
#[derive(Clone)]
pub struct MathSvgServer {
    tool_router: ToolRouter<Self>,
    service: FormulaService,
    lookup_budget: Duration,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl MathSvgServer {
    /// Create a new server handler.
    ///
    /// `lookup_budget` bounds remote reads made by cache_get.
    pub fn new(service: FormulaService, lookup_budget: Duration) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
            lookup_budget,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Render a TeX formula to SVG.
    #[tool(
        description = "Render a TeX formula to SVG. Returns the SVG document, its fingerprint and whether it was served from cache."
    )]
    async fn render_formula(&self, params: Parameters<RenderFormulaParams>) -> Result<CallToolResult, McpError> {
        render_impl(&self.service, params.0).await
    }

    /// Retrieve a previously rendered SVG by fingerprint.
    #[tool(description = "Look up a cached SVG by the fingerprint returned from render_formula. Never renders.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(self.service.cache(), params.0, self.lookup_budget).await
    }

    /// Report cache counters and uptime.
    #[tool(description = "Report cache hit/miss counters, local entry count, remote tier health and server uptime.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(self.service.cache(), self.started, self.started_at)
    }
}

impl ServerHandler for MathSvgServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mathsvg".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
