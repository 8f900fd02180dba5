//! Number formatting for terminal output.

const YI: f64 = 100_000_000.0;
const WAN: f64 = 10_000.0;

/// Premium in yuan, scaled to 亿 / 万 with two decimals.
pub fn format_premium(value: f64) -> String {
    if value >= YI {
        format!("{:.2} 亿", value / YI)
    } else if value >= WAN {
        format!("{:.2} 万", value / WAN)
    } else {
        format!("{value:.2}")
    }
}

/// Policy counts: scaled to 万 when large, otherwise grouped by thousands.
pub fn format_count(value: f64) -> String {
    if value >= WAN {
        return format!("{:.2} 万", value / WAN);
    }
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_share(share: f64) -> String {
    format!("{share:.1}%")
}
