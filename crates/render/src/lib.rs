//! Formula rendering for mathsvg.
//!
//! This crate provides:
//! - The [`Renderer`] capability and a placeholder [`StubRenderer`]
//! - Formula normalization and input validation
//! - [`FormulaService`], which runs a request through the tiered cache and
//!   renders on miss

pub mod renderer;
pub mod service;
pub mod validation;

pub use renderer::{FALLBACK_SVG, RenderError, Renderer, StubRenderer};
pub use service::{FormulaService, RenderOutcome};
pub use validation::normalize_formula;
