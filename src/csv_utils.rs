//! Shared header lookup helpers for the source parsers
//!
//! Report schemas change column/tag case between versions, so every lookup tries
//! an exact match first and falls back to a case-insensitive one.

/// Position of a column in a header row
///
/// # Example
///
/// ```rust
/// use csv::StringRecord;
/// use gridnorm::csv_utils::find_column;
///
/// let headers = StringRecord::from(vec!["Hour", "NUCLEAR", "Wind"]);
/// assert_eq!(find_column(&headers, "NUCLEAR"), Some(1));
/// assert_eq!(find_column(&headers, "WIND"), Some(2));
/// assert_eq!(find_column(&headers, "Solar"), None);
/// ```
pub fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
}

/// Value of a named cell in a parsed row
///
/// Same matching rule as `find_column`, for rows that are already name/value pairs.
pub fn lookup_cell<'a>(cells: &'a [(String, String)], name: &str) -> Option<&'a str> {
    cells
        .iter()
        .find(|(k, _)| k == name)
        .or_else(|| cells.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_column_prefers_exact() {
        let headers = csv::StringRecord::from(vec!["wind", "WIND"]);

        assert_eq!(find_column(&headers, "WIND"), Some(1));
        assert_eq!(find_column(&headers, "Wind"), Some(0));
        assert_eq!(find_column(&headers, "Solar"), None);
    }

    #[test]
    fn test_lookup_cell() {
        let cells = vec![
            ("Time".to_string(), "01:00".to_string()),
            ("Coal".to_string(), "12".to_string()),
        ];
        assert_eq!(lookup_cell(&cells, "COAL"), Some("12"));
        assert_eq!(lookup_cell(&cells, "Gas"), None);

        let mixed = vec![
            ("hour".to_string(), "1".to_string()),
            ("Hour".to_string(), "2".to_string()),
        ];
        assert_eq!(lookup_cell(&mixed, "Hour"), Some("2"));
    }
}
