use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::cache::CacheState;
use crate::quote::Snapshot;
use crate::utils::{format_age, format_timestamp};

use super::format::{format_change, format_price, format_volume};

const HEADERS: [&str; 5] = ["Symbol", "Name", "Price", "Change", "Volume"];

/// Bordered table; text columns are left aligned, the rest right aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], left_aligned: usize) -> String {
    let all_rows: Vec<Vec<String>> = std::iter::once(headers.iter().map(|h| h.to_string()).collect())
        .chain(rows.iter().cloned())
        .collect();

    let mut col_widths = vec![0; headers.len()];
    for row in &all_rows {
        for (i, cell) in row.iter().enumerate().take(col_widths.len()) {
            col_widths[i] = col_widths[i].max(cell.width());
        }
    }

    let border = format!(
        "+{}+",
        col_widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');

    for (row_idx, row) in all_rows.iter().enumerate() {
        let formatted_row = row
            .iter()
            .zip(&col_widths)
            .enumerate()
            .map(|(col, (cell, width))| {
                let padding = " ".repeat(width - cell.width());
                if col < left_aligned {
                    format!(" {}{} ", cell, padding)
                } else {
                    format!(" {}{} ", padding, cell)
                }
            })
            .collect::<Vec<_>>()
            .join("|");

        out.push_str(&format!("|{}|\n", formatted_row));
        if row_idx == 0 {
            out.push_str(&border);
            out.push('\n');
        }
    }

    out.push_str(&border);
    out
}

pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let rows: Vec<Vec<String>> = snapshot
        .entries()
        .iter()
        .map(|quote| {
            vec![
                quote.symbol.clone(),
                quote.display_name().to_string(),
                format_price(quote.current_price),
                format_change(quote),
                format_volume(quote.volume),
            ]
        })
        .collect();

    render_table(&HEADERS, &rows, 2)
}

/// Status lines followed by the quote table, as shown by `watch`.
pub fn render_state(state: &CacheState, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    if state.is_refreshing {
        lines.push("Updating...".to_string());
    }
    if let Some(error) = state.last_error {
        lines.push(format!("! {}", error.user_message()));
    }

    match &state.snapshot {
        Some(snapshot) => {
            lines.push(format!(
                "Last updated {} ({} ago)",
                format_timestamp(snapshot.captured_at()),
                format_age(snapshot.age(now))
            ));
            lines.push(render_snapshot(snapshot));
        }
        None if state.no_data => lines.push("No data available.".to_string()),
        None => lines.push("Loading quotes...".to_string()),
    }

    lines.join("\n")
}
