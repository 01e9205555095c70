use crate::quote::Quote;

const UP: &str = "▲";
const DOWN: &str = "▼";

/// `▲ 1.23%`, `▼ 0.40%`, or `N/A` when the change is undefined.
pub fn format_change(quote: &Quote) -> String {
    if quote.change().is_none() {
        return "N/A".to_string();
    }

    let percent = quote.change_percent;
    let marker = if percent > 0.0 {
        UP
    } else if percent < 0.0 {
        DOWN
    } else {
        return format!("{:.2}%", 0.0);
    };
    format!("{} {:.2}%", marker, percent.abs())
}

pub fn format_volume(volume: Option<f64>) -> String {
    let Some(volume) = volume.filter(|v| v.is_finite()) else {
        return "N/A".to_string();
    };

    if volume >= 1e9 {
        format!("{:.2}B", volume / 1e9)
    } else if volume >= 1e6 {
        format!("{:.2}M", volume / 1e6)
    } else if volume >= 1e3 {
        format!("{:.2}K", volume / 1e3)
    } else {
        format!("{:.0}", volume)
    }
}

/// Two decimals with `,` thousands separators.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return "N/A".to_string();
    }

    let raw = format!("{:.2}", price.abs());
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}
