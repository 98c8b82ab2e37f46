//! Human-readable byte counts for limits and CLI summaries.

const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

/// Format a byte count in IEC units, trimming trailing zeros.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let precision = if value >= 10.0 { 1 } else { 2 };
    let rendered = format!("{value:.precision$}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::human_size;

    #[test]
    fn scales_through_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1024), "1 KiB");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(50 * 1024 * 1024), "50 MiB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "5.5 GiB");
    }
}
