//! Numeric cleaning shared by all source parsers
//!
//! Grid operators publish the same quantity in several textual shapes. This module
//! turns a raw cell into a `RawValue` before any domain normalization happens.
//!
//! # Transformations
//!
//! 1. **Missing markers**: `"N.A."`, `"N.E."`, `"-"`, `""` → `RawValue::Missing`
//! 2. **Thousands separators**: `"12,345.6"` → `12345.6`
//! 3. **Decimal comma**: `"1.234,5"` → `1234.5` (when enabled for the source)
//! 4. **Trailing sentinels**: `"512*"`, `"87 MW"` → `512.0`, `87.0`
//! 5. **Error sentinels**: whole-row markers such as `"#VALUE!"` are matched separately
//!
//! # Example
//!
//! ```rust
//! use gridnorm::transformations::clean_numeric;
//! use gridnorm::RawValue;
//!
//! assert_eq!(clean_numeric("12,345.6", false), RawValue::Number(12345.6));
//! assert_eq!(clean_numeric("N.A.", false), RawValue::Missing);
//! assert_eq!(clean_numeric("1.234,5", true), RawValue::Number(1234.5));
//! ```

use crate::types::RawValue;

// ============================================================================
// Transformation 1: Missing markers
// ============================================================================

/// Check whether a cell denotes a missing value
///
/// Matches case-insensitively and tolerates the dotted/undotted variants that
/// appear across report versions.
///
/// # Examples
///
/// ```
/// # use gridnorm::transformations::is_missing_marker;
/// assert!(is_missing_marker("N.A."));
/// assert!(is_missing_marker("n/a"));
/// assert!(is_missing_marker("  "));
/// assert!(is_missing_marker("-"));
/// assert!(!is_missing_marker("0"));
/// ```
pub fn is_missing_marker(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }

    matches!(
        trimmed.to_uppercase().as_str(),
        "N.A." | "N.A" | "NA" | "N/A" | "N.E." | "N.E" | "NE" | "-" | "--" | "NULL"
    )
}

// ============================================================================
// Transformation 2 + 3: Separators
// ============================================================================

/// Remove thousands separators and normalize the decimal mark to `.`
///
/// # Arguments
///
/// * `value` - Trimmed numeric text
/// * `decimal_comma` - Source writes `1.234,5` instead of `1,234.5`
///
/// # Examples
///
/// ```
/// # use gridnorm::transformations::normalize_separators;
/// assert_eq!(normalize_separators("12,345.6", false), "12345.6");
/// assert_eq!(normalize_separators("12.345,6", true), "12345.6");
/// assert_eq!(normalize_separators("1 000", false), "1000");
/// ```
pub fn normalize_separators(value: &str, decimal_comma: bool) -> String {
    let (thousands, decimal) = if decimal_comma { ('.', ',') } else { (',', '.') };

    value
        .chars()
        .filter(|c| *c != thousands && !c.is_whitespace() && *c != '_')
        .map(|c| if c == decimal { '.' } else { c })
        .collect()
}

// ============================================================================
// Transformation 4: Trailing sentinels
// ============================================================================

/// Strip trailing non-numeric characters such as footnote stars or units
///
/// # Examples
///
/// ```
/// # use gridnorm::transformations::strip_trailing_sentinel;
/// assert_eq!(strip_trailing_sentinel("512*"), "512");
/// assert_eq!(strip_trailing_sentinel("87MW"), "87");
/// assert_eq!(strip_trailing_sentinel("1.5"), "1.5");
/// assert_eq!(strip_trailing_sentinel("abc"), "");
/// ```
pub fn strip_trailing_sentinel(value: &str) -> &str {
    value.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.')
}

/// Convert a raw cell into a cleaned `RawValue`
///
/// # Arguments
///
/// * `value` - Raw cell text
/// * `decimal_comma` - Source uses a decimal comma
///
/// # Returns
///
/// * `RawValue::Missing` - Empty cell or missing marker
/// * `RawValue::Number(f64)` - Finite number after cleaning
/// * `RawValue::Text(String)` - Anything that is not a number
///
/// # Examples
///
/// ```
/// # use gridnorm::transformations::clean_numeric;
/// # use gridnorm::RawValue;
/// assert_eq!(clean_numeric("-1,200", false), RawValue::Number(-1200.0));
/// assert_eq!(clean_numeric("512*", false), RawValue::Number(512.0));
/// assert_eq!(clean_numeric("", false), RawValue::Missing);
/// assert_eq!(clean_numeric("Hydro", false), RawValue::Text("Hydro".to_string()));
/// ```
pub fn clean_numeric(value: &str, decimal_comma: bool) -> RawValue {
    let trimmed = value.trim();
    if is_missing_marker(trimmed) {
        return RawValue::Missing;
    }

    let normalized = normalize_separators(trimmed, decimal_comma);
    let stripped = strip_trailing_sentinel(&normalized);

    match stripped.parse::<f64>() {
        Ok(v) if v.is_finite() => RawValue::Number(v),
        _ => RawValue::Text(trimmed.to_string()),
    }
}

// ============================================================================
// Transformation 5: Error sentinels
// ============================================================================

/// Check whether a cell equals one of the source's error sentinels
///
/// Rows carrying an error sentinel are dropped entirely rather than parsed.
///
/// # Examples
///
/// ```
/// # use gridnorm::transformations::is_error_sentinel;
/// let sentinels = vec!["#VALUE!".to_string(), "ERROR".to_string()];
/// assert!(is_error_sentinel(" error ", &sentinels));
/// assert!(!is_error_sentinel("12", &sentinels));
/// ```
pub fn is_error_sentinel(value: &str, sentinels: &[String]) -> bool {
    let trimmed = value.trim();
    sentinels
        .iter()
        .any(|s| s.trim().eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_markers_case_insensitive() {
        for marker in ["N.A.", "n.a.", "NA", "N.E.", "ne", "-", "", "   ", "null"] {
            assert!(is_missing_marker(marker), "{marker:?} should be missing");
        }
        assert!(!is_missing_marker("0"));
        assert!(!is_missing_marker("0.0"));
    }

    #[test]
    fn test_clean_numeric_thousands() {
        assert_eq!(clean_numeric("1,234,567", false), RawValue::Number(1234567.0));
        assert_eq!(clean_numeric("12,345.25", false), RawValue::Number(12345.25));
    }

    #[test]
    fn test_clean_numeric_decimal_comma() {
        assert_eq!(clean_numeric("119,5", true), RawValue::Number(119.5));
        assert_eq!(clean_numeric("2.025,870", true), RawValue::Number(2025.87));
        assert_eq!(clean_numeric("0,000", true), RawValue::Number(0.0));
    }

    #[test]
    fn test_clean_numeric_negative_allowed() {
        // net imports are negative
        assert_eq!(clean_numeric("-350.5", false), RawValue::Number(-350.5));
    }

    #[test]
    fn test_clean_numeric_trailing_sentinel() {
        assert_eq!(clean_numeric("87 MW", false), RawValue::Number(87.0));
        assert_eq!(clean_numeric("42.0*", false), RawValue::Number(42.0));
    }

    #[test]
    fn test_clean_numeric_text() {
        assert_eq!(clean_numeric("NaN", false), RawValue::Text("NaN".to_string()));
        assert_eq!(
            clean_numeric("#VALUE!", false),
            RawValue::Text("#VALUE!".to_string())
        );
    }

    #[test]
    fn test_missing_is_not_zero() {
        assert_ne!(clean_numeric("N.A.", false), RawValue::Number(0.0));
        assert_eq!(clean_numeric("N.A.", false).as_number(), None);
    }

    #[test]
    fn test_error_sentinel_match() {
        let sentinels = vec!["#VALUE!".to_string()];
        assert!(is_error_sentinel("#value!", &sentinels));
        assert!(!is_error_sentinel("", &sentinels));
        assert!(!is_error_sentinel("#VALUE!", &[]));
    }
}
