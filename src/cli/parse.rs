use std::{fmt::Display, ops::RangeInclusive, str::FromStr, time::Duration};

use humantime::parse_duration;

pub fn parse_range_inclusive<N: PartialEq + PartialOrd + FromStr + Display>(
    s: &str,
    range: RangeInclusive<N>,
) -> Result<N, String> {
    let value: N = s.parse().map_err(|_| "invalid numeric value")?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{} is not in range {}-{}",
            value,
            range.start(),
            range.end(),
        ))
    }
}

/// Parses a byte count with an optional decimal suffix (`k`, `M`, `G`).
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((index, 'k' | 'K')) => (&s[..index], 1000),
        Some((index, 'M')) => (&s[..index], 1000 * 1000),
        Some((index, 'G')) => (&s[..index], 1000 * 1000 * 1000),
        _ => (s, 1),
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size `{s}`"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size `{s}` is too large"))
}

pub fn parse_nonzero_duration(s: &str) -> Result<Duration, String> {
    let duration = parse_duration(s).map_err(|err| err.to_string())?;
    if duration.is_zero() {
        Err("duration must not be zero".to_owned())
    } else {
        Ok(duration)
    }
}
