//! Size and number parsing
//!
//! Device variables report sizes as hex (`0x80000000`) or decimal. User
//! input and template files additionally accept unit suffixes such as
//! `"2 GiB"`, `"256M"` or `"64K"`.

use crate::error::{Error, Result};

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| Error::InvalidSize(format!("{}: {}", s, e)))
    } else {
        s.parse()
            .map_err(|e| Error::InvalidSize(format!("{}: {}", s, e)))
    }
}

/// Parse a size string like "16 MiB", "256M", "0x1000" or "4096"
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let s_lower = s.to_lowercase();
    let suffixes: [(&str, u64); 10] = [
        ("gib", 1 << 30),
        ("gb", 1 << 30),
        ("g", 1 << 30),
        ("mib", 1 << 20),
        ("mb", 1 << 20),
        ("m", 1 << 20),
        ("kib", 1 << 10),
        ("kb", 1 << 10),
        ("k", 1 << 10),
        ("b", 1),
    ];

    for (suffix, multiplier) in suffixes {
        if let Some(n) = s_lower.strip_suffix(suffix) {
            let n = parse_number(n)?;
            return n
                .checked_mul(multiplier)
                .ok_or_else(|| Error::InvalidSize(format!("{}: too large", s)));
        }
    }

    Err(Error::InvalidSize(s.to_string()))
}

/// Format a size as human-readable string
pub fn format_size(size: u64) -> String {
    if size >= 1 << 30 && size % (1 << 30) == 0 {
        format!("{} GiB", size >> 30)
    } else if size >= 1 << 20 && size % (1 << 20) == 0 {
        format!("{} MiB", size >> 20)
    } else if size >= 1 << 10 && size % (1 << 10) == 0 {
        format!("{} KiB", size >> 10)
    } else {
        format!("{}", size)
    }
}

/// Round `value` up to a multiple of `align` (`align` must be non-zero)
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}
