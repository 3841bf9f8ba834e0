//! String normalization for deterministic serialization.
//!
//! All canonical strings are Unicode NFC normalized. Identifiers (truth key
//! segments, agent ids, claim type ids) are further restricted to the
//! charset `[a-z0-9._-]`.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfc_quick};

use super::json::CanonicalError;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9._-]+$").expect("static pattern"))
}

/// Normalizes a string to Unicode NFC form.
///
/// Equivalent Unicode sequences become identical: `e` + combining acute and
/// the precomposed `é` produce the same bytes.
#[must_use]
pub fn normalize_nfc(s: &str) -> String {
    if is_nfc_quick(s.chars()) == IsNormalized::Yes {
        s.to_string()
    } else {
        s.nfc().collect()
    }
}

/// Canonicalizes a free-form string value.
///
/// Applies NFC normalization, then optional trimming and internal-whitespace
/// collapse when the carrying contract field specifies them.
#[must_use]
pub fn canonical_string_value(s: &str, trim: bool, collapse_whitespace: bool) -> String {
    let mut out = normalize_nfc(s);
    if trim {
        out = out.trim().to_string();
    }
    if collapse_whitespace {
        let mut collapsed = String::with_capacity(out.len());
        let mut in_ws = false;
        for c in out.chars() {
            if c.is_whitespace() {
                if !in_ws {
                    collapsed.push(' ');
                }
                in_ws = true;
            } else {
                collapsed.push(c);
                in_ws = false;
            }
        }
        out = collapsed;
    }
    out
}

/// Returns `true` when `s` conforms to the canonical identifier charset
/// `[a-z0-9._-]+`.
#[must_use]
pub fn is_canonical_id(s: &str) -> bool {
    id_pattern().is_match(s)
}

/// Converts an arbitrary string into a canonical identifier.
///
/// Lowercases, replaces invalid characters with `_`, collapses runs of `_`,
/// and strips leading/trailing `_`.
///
/// # Errors
///
/// Returns [`CanonicalError::EmptyIdentifier`] when nothing survives.
pub fn to_canonical_id(s: &str) -> Result<String, CanonicalError> {
    let lowered = normalize_nfc(s).to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_underscore = false;
    for c in lowered.chars() {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-') {
            c
        } else {
            '_'
        };
        if mapped == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(mapped);
            last_underscore = false;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        return Err(CanonicalError::EmptyIdentifier);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nfc_normalization() {
        // e + combining acute accent normalizes to precomposed e-acute
        let decomposed = "e\u{0301}";
        assert_eq!(normalize_nfc(decomposed), "\u{00e9}");
        // Already-NFC strings pass through unchanged
        assert_eq!(normalize_nfc("hello"), "hello");
    }

    #[test]
    fn test_canonical_string_value_trim_collapse() {
        assert_eq!(
            canonical_string_value("  two   words \n", true, true),
            "two words"
        );
        assert_eq!(
            canonical_string_value("  keep  ", false, false),
            "  keep  "
        );
    }

    #[test]
    fn test_is_canonical_id() {
        assert!(is_canonical_id("earth.flood.v1"));
        assert!(is_canonical_id("agent-01_a"));
        assert!(!is_canonical_id("Earth.Flood"));
        assert!(!is_canonical_id("with space"));
        assert!(!is_canonical_id(""));
    }

    #[test]
    fn test_to_canonical_id() {
        assert_eq!(to_canonical_id("Flood Warning!").unwrap(), "flood_warning");
        assert_eq!(to_canonical_id("a__b").unwrap(), "a_b");
        assert_eq!(to_canonical_id("__x__").unwrap(), "x");
        assert!(to_canonical_id("!!!").is_err());
    }
}
