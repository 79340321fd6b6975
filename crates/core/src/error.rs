//! Unified error types for mathsvg.
//!
//! Messages carry a stable code prefix that clients can match on.

use rmcp::model::{ErrorCode, ErrorData as McpError};

use crate::cache::TierError;

/// Unified error types for the mathsvg service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Formula is empty after trimming.
    #[error("EMPTY_FORMULA: formula is empty")]
    EmptyFormula,

    /// Formula exceeds the configured size ceiling.
    #[error("FORMULA_TOO_LARGE: {size} bytes exceeds the {max} byte limit")]
    FormulaTooLarge { size: usize, max: usize },

    /// Formula contains a disallowed control character.
    #[error("INVALID_CHARACTERS: control character U+{code:04X} at byte {offset}")]
    InvalidCharacters { code: u32, offset: usize },

    /// Not a 64-char lowercase hex fingerprint.
    #[error("INVALID_FINGERPRINT: expected 64 lowercase hex characters")]
    InvalidFingerprint,

    /// The render capability reported a failure.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// Cache tier operation failed.
    #[error("CACHE_ERROR: {0}")]
    Cache(#[from] TierError),
}

impl Error {
    /// Whether the error was caused by the caller's input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::EmptyFormula | Error::FormulaTooLarge { .. } | Error::InvalidCharacters { .. })
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::EmptyFormula | Error::FormulaTooLarge { .. } | Error::InvalidCharacters { .. } => -32602,
            Error::InvalidFingerprint => -32602,
            Error::RenderFailed(_) => -32012,
            Error::Cache(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
