//! Human-friendly duration parsing (`250ms`, `30s`, `5m`, `2h`).

use std::time::Duration;

/// Parse a duration with an `ms`, `s`, `m` or `h` suffix. A bare number is
/// read as seconds. Fractional values are accepted (`1.5m`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let amount: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;

    let millis_per_unit = match unit.trim() {
        "ms" => 1.0,
        "" | "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };

    let millis = amount * millis_per_unit;
    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("invalid duration '{}'", raw));
    }
    Ok(Duration::from_millis(millis.round() as u64))
}
