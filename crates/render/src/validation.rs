//! Formula normalization and input validation.

use mathsvg_core::Error;

/// Trim `raw` and check it is acceptable as a cache key and render input.
///
/// # Errors
///
/// - `Error::EmptyFormula` if nothing remains after trimming
/// - `Error::FormulaTooLarge` if the trimmed text exceeds `max_bytes`
/// - `Error::InvalidCharacters` on a control character other than `\n`, `\r`
///   or `\t`
pub fn normalize_formula(raw: &str, max_bytes: usize) -> Result<String, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyFormula);
    }

    if trimmed.len() > max_bytes {
        return Err(Error::FormulaTooLarge { size: trimmed.len(), max: max_bytes });
    }

    if let Some((offset, c)) = trimmed.char_indices().find(|(_, c)| is_disallowed(*c)) {
        return Err(Error::InvalidCharacters { code: c as u32, offset });
    }

    Ok(trimmed.to_string())
}

fn is_disallowed(c: char) -> bool {
    !matches!(c, '\n' | '\r' | '\t') && (c < '\u{20}' || c == '\u{7f}')
}
