/// Number formatting for card display
///
/// Grouping follows en-US conventions (`1,234,567.89`).
use chrono::{DateTime, Local, Utc};

/// Placeholder for absent values
pub const MISSING: &str = "—";

/// Format a price: grouped 2 decimals from 1000 up, 4 decimals from 1 up, else 6
pub fn format_price(price: f64) -> String {
    if price >= 1000.0 {
        group_thousands(price, 2)
    } else if price >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}

/// Format a quantity with thousands separators and 2 decimals
pub fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) => group_thousands(v, 2),
        None => MISSING.to_string(),
    }
}

/// Format a USDT amount ("$1,234.50")
pub fn format_usdt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${}", group_thousands(v, 2)),
        None => MISSING.to_string(),
    }
}

/// Format a percent change with explicit sign ("+1.25%")
pub fn format_change(change_pct: f64) -> String {
    format!("{:+.2}%", change_pct)
}

/// Local wall clock time of a snapshot ("14:03:27")
pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Fixed decimals with comma thousands separators
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && value != 0.0 {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}
