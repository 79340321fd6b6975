//! Request orchestration: validate, look up, render on miss, write back.

use std::sync::Arc;
use std::time::Duration;

use mathsvg_core::config::ServerConfig;
use mathsvg_core::{Error, Fingerprint, HitLevel, TieredCache, fingerprint};
use tokio::time::Instant;
use tracing::{error, info};

use crate::renderer::Renderer;
use crate::validation::normalize_formula;

/// Result of a successful render request.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub svg: String,
    pub fingerprint: Fingerprint,
    pub hit_level: HitLevel,
    /// Time spent in the renderer; zero on a cache hit.
    pub render_duration: Duration,
    pub total_duration: Duration,
}

/// Serves formulas from the tiered cache, rendering only on a miss.
#[derive(Clone)]
pub struct FormulaService {
    cache: TieredCache,
    renderer: Arc<dyn Renderer>,
    request_timeout: Duration,
    max_formula_bytes: usize,
}

impl std::fmt::Debug for FormulaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormulaService")
            .field("cache", &self.cache)
            .field("renderer", &self.renderer.name())
            .field("request_timeout", &self.request_timeout)
            .field("max_formula_bytes", &self.max_formula_bytes)
            .finish()
    }
}

impl FormulaService {
    pub fn new(cache: TieredCache, renderer: Arc<dyn Renderer>, config: &ServerConfig) -> Self {
        Self {
            cache,
            renderer,
            request_timeout: config.request_timeout(),
            max_formula_bytes: config.max_formula_bytes,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Produce the SVG for `raw`.
    ///
    /// Remote cache lookups share the request timeout. Render failures are
    /// returned as `Error::RenderFailed` and never cached.
    ///
    /// # Errors
    ///
    /// Returns the validation error for unacceptable input, or
    /// `Error::RenderFailed` if the renderer fails.
    pub async fn render(&self, raw: &str) -> Result<RenderOutcome, Error> {
        let started = Instant::now();
        let formula = normalize_formula(raw, self.max_formula_bytes)?;
        let key = fingerprint(&formula);

        let (cached, hit_level) = self.cache.get(&key, started + self.request_timeout).await;

        let (svg, render_duration) = match cached {
            Some(svg) => (svg, Duration::ZERO),
            None => {
                let render_started = Instant::now();
                let result = self.renderer.render(&formula).await;
                let render_duration = render_started.elapsed();

                match result {
                    Ok(svg) => {
                        self.cache.set(&key, &svg);
                        (svg, render_duration)
                    }
                    Err(e) => {
                        error!(
                            renderer = self.renderer.name(),
                            fingerprint = %key,
                            render_duration_ms = millis(render_duration),
                            error = %e,
                            "formula render failed"
                        );
                        return Err(Error::RenderFailed(e.to_string()));
                    }
                }
            }
        };

        let total_duration = started.elapsed();
        info!(
            fingerprint = %key,
            cache_hit_level = %hit_level,
            render_duration_ms = millis(render_duration),
            request_duration_ms = millis(total_duration),
            formula_length = formula.chars().count(),
            "formula rendered"
        );

        Ok(RenderOutcome { svg, fingerprint: key, hit_level, render_duration, total_duration })
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
