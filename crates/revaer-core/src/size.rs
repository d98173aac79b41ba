//! Size parsing/formatting helpers (§6).

use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*(KIB|MIB|GIB|TIB|KB|MB|GB|TB|B)\s*$")
        .expect("size pattern is a valid static regex")
});

/// Parse a human-readable size string into a byte count.
///
/// Accepts decimal units (`B, KB, MB, GB, TB`, factor `1000^k`) and binary
/// units (`KiB, MiB, GiB, TiB`, factor `1024^k`), case-insensitively.
/// Unrecognized input normalizes to `0`.
#[must_use]
pub fn normalize_size(input: &str) -> u64 {
    let trimmed = input.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return value;
    }

    let Some(captures) = SIZE_PATTERN.captures(trimmed) else {
        return 0;
    };
    let Ok(value) = captures[1].parse::<f64>() else {
        return 0;
    };
    let unit = captures[2].to_uppercase();
    let multiplier: f64 = match unit.as_str() {
        "B" => 1.0,
        "KB" => 1_000.0,
        "KIB" => 1_024.0,
        "MB" => 1_000_000.0,
        "MIB" => 1_048_576.0,
        "GB" => 1_000_000_000.0,
        "GIB" => 1_073_741_824.0,
        "TB" => 1_000_000_000_000.0,
        "TIB" => 1_099_511_627_776.0,
        _ => return 0,
    };

    #[expect(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "size strings never parse to negative or out-of-range values here"
    )]
    let bytes = (value * multiplier) as u64;
    bytes
}

/// Format a byte count as `"<value> <unit>"` with two decimal places,
/// dividing by 1024 until the value is below 1024 or the unit list is
/// exhausted.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    #[expect(clippy::cast_precision_loss, reason = "display-only conversion")]
    let mut value = bytes as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.2} {}", value, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_binary_and_decimal_units() {
        assert_eq!(normalize_size("1.5 GiB"), 1_610_612_736);
        assert_eq!(normalize_size("1.5 GB"), 1_500_000_000);
        assert_eq!(normalize_size("garbage"), 0);
        assert_eq!(normalize_size("4096"), 4096);
    }

    #[test]
    fn formats_bytes_to_human_readable() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1_610_612_736), "1.50 GB");
    }
}
