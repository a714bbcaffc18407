// Tue Jan 13 2026 - Alex

pub mod logging;
pub mod testing;

pub use logging::LoggingUtils;

/// Parses `0x`-prefixed hex or plain decimal.
pub fn parse_address(s: &str) -> Option<u64> {
    let s = s.trim().replace('_', "");
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Keeps the tail of `s`, which is the informative end of an install path.
pub fn truncate_start(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        return s.to_string();
    }
    if max_len < 3 {
        return s.chars().skip(count - max_len).collect();
    }
    let tail: String = s.chars().skip(count - (max_len - 3)).collect();
    format!("...{}", tail)
}
