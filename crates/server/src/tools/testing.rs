//! Local-only services for tool tests.

use std::sync::Arc;

use mathsvg_core::TieredCache;
use mathsvg_core::cache::{LocalTierConfig, ShardedLocalCache, TieredOptions};
use mathsvg_core::config::ServerConfig;
use mathsvg_render::{FormulaService, RenderError, Renderer, StubRenderer};

struct BrokenRenderer;

#[async_trait::async_trait]
impl Renderer for BrokenRenderer {
    async fn render(&self, _formula: &str) -> Result<String, RenderError> {
        Err(RenderError::Engine("missing closing brace".into()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

fn build(renderer: Arc<dyn Renderer>) -> FormulaService {
    let local = Arc::new(ShardedLocalCache::new(LocalTierConfig::default()));
    let cache = TieredCache::new(local, None, TieredOptions::default());
    FormulaService::new(cache, renderer, &ServerConfig::default())
}

pub fn service() -> FormulaService {
    build(Arc::new(StubRenderer::new()))
}

pub fn failing_service() -> FormulaService {
    build(Arc::new(BrokenRenderer))
}
