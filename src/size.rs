//! Human-readable byte counts.

/// Binary-prefix unit labels, largest last. `u64::MAX` fits in EB.
const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Formats a byte count with base-1024 units and two decimals.
///
/// Zero renders as `"0B"`; everything else is scaled to the largest unit that
/// keeps the value at or above 1, e.g. `1536` becomes `"1.50 KB"`.
///
/// # Example
///
/// ```
/// use mediarelay_core::format_size;
///
/// assert_eq!(format_size(0), "0B");
/// assert_eq!(format_size(10_485_760), "10.00 MB");
/// ```
#[must_use]
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut unit = 0;
    let mut threshold: u64 = 1024;
    while unit + 1 < UNITS.len() && bytes >= threshold {
        unit += 1;
        threshold = threshold.saturating_mul(1024);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation
    )]
    let scaled = bytes as f64 / 1024f64.powi(unit as i32);
    format!("{scaled:.2} {}", UNITS[unit])
}

/// Parses a human size such as `"12.5 MB"`, `"700KB"` or `"1048576"` into bytes.
///
/// Units are case-insensitive and base 1024; `KiB`-style spellings and single
/// letters (`K`, `M`, `G`) are accepted. Returns `None` for anything else.
#[must_use]
pub fn parse_size_text(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit.trim_end_matches("IB").trim_end_matches('B');
    let exponent = match unit {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        "E" => 6,
        _ => return None,
    };

    let bytes = value * 1024f64.powi(exponent);
    #[allow(clippy::cast_precision_loss)]
    let max = u64::MAX as f64;
    if bytes >= max {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = bytes.round() as u64;
    Some(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_zero_has_no_space() {
        assert_eq!(format_size(0), "0B");
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(1), "1.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
    }

    #[test]
    fn test_format_size_unit_boundaries() {
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_size(1024_u64.pow(4)), "1.00 TB");
        assert_eq!(format_size(1024_u64.pow(5)), "1.00 PB");
        assert_eq!(format_size(1024_u64.pow(6)), "1.00 EB");
    }

    #[test]
    fn test_format_size_two_decimals() {
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(10_000_000), "9.54 MB");
    }

    #[test]
    fn test_format_size_max_value_stays_in_eb() {
        assert_eq!(format_size(u64::MAX), "16.00 EB");
    }

    #[test]
    fn test_parse_size_text_units() {
        assert_eq!(parse_size_text("1048576"), Some(1_048_576));
        assert_eq!(parse_size_text("700 B"), Some(700));
        assert_eq!(parse_size_text("1.5 KB"), Some(1536));
        assert_eq!(parse_size_text("12.5MB"), Some(13_107_200));
        assert_eq!(parse_size_text("2 GiB"), Some(2_147_483_648));
        assert_eq!(parse_size_text("3g"), Some(3_221_225_472));
    }

    #[test]
    fn test_parse_size_text_rejects_garbage() {
        assert_eq!(parse_size_text("Unknown"), None);
        assert_eq!(parse_size_text(""), None);
        assert_eq!(parse_size_text("12 parsecs"), None);
        assert_eq!(parse_size_text("1.2.3 MB"), None);
    }

    #[test]
    fn test_parse_size_text_reads_format_size_output() {
        assert_eq!(parse_size_text(&format_size(1536)), Some(1536));
    }
}
