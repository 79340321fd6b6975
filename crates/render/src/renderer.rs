//! Formula → SVG render capability.
//!
//! The real typesetting engine sits behind the [`Renderer`] trait. Until one
//! is wired in, [`StubRenderer`] produces a placeholder image that shows the
//! formula source so clients can be developed against the service.

use thiserror::Error;

/// Artifact returned to clients when a formula is rejected or fails to render.
pub const FALLBACK_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 320 80">"##,
    r##"<rect width="100%" height="100%" fill="#fef2f2"/>"##,
    r##"<text x="20" y="45" font-size="20" font-family="sans-serif" fill="#b91c1c">Formula failed to render, check the input</text>"##,
    "</svg>"
);

/// Errors that can occur while rendering a formula.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Nothing to render after trimming.
    #[error("formula is empty")]
    EmptyInput,

    /// The engine rejected the formula or crashed.
    #[error("render engine failed: {0}")]
    Engine(String),
}

/// Render capability.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a normalized formula into a complete SVG document.
    async fn render(&self, formula: &str) -> Result<String, RenderError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Placeholder renderer that echoes the formula text inside an SVG.
#[derive(Debug, Clone)]
pub struct StubRenderer {
    base_width: usize,
    height: usize,
}

impl Default for StubRenderer {
    fn default() -> Self {
        Self { base_width: 400, height: 80 }
    }
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, formula: &str) -> Result<String, RenderError> {
        let trimmed = formula.trim();
        if trimmed.is_empty() {
            return Err(RenderError::EmptyInput);
        }

        let width = self.base_width + trimmed.chars().count() * 6;
        let height = self.height;
        let baseline = height / 2;

        Ok(format!(
            concat!(
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" preserveAspectRatio="xMinYMin meet">"##,
                r##"<rect width="100%" height="100%" fill="#f8fafc"/>"##,
                r##"<text x="20" y="{baseline}" font-size="20" font-family="monospace" fill="#0f172a">{text}</text>"##,
                r##"<text x="20" y="{note}" font-size="14" font-family="monospace" fill="#64748b">render engine pending, placeholder output</text>"##,
                "</svg>"
            ),
            width = width,
            height = height,
            baseline = baseline,
            text = escape_text(trimmed),
            note = baseline + 24,
        ))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Escape text for inclusion in SVG character data or attribute values.
fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
