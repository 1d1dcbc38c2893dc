//! Aligned plain-text tables for terminal reports.

use std::{borrow::Cow, fmt::Write as _};

use crate::data::parse_number;

/// Renders `rows` under `headers`. Columns whose every non-blank cell is
/// numeric are right-aligned; all others are left-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count().max(1)).collect();
    let mut numeric = vec![true; column_count];
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(sanitize_cell(cell).chars().count());
            let trimmed = cell.trim();
            if !trimmed.is_empty() && parse_number(trimmed).is_none() {
                numeric[idx] = false;
            }
        }
    }
    if rows.is_empty() {
        numeric.fill(false);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &numeric));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    let rule_widths: Vec<usize> = widths.iter().map(|w| (*w).max(3)).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &rule_widths, &vec![false; column_count]));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let cells: Vec<String> = values
        .iter()
        .zip(widths)
        .zip(right_align)
        .map(|((value, width), right)| {
            let width = *width;
            let cell = sanitize_cell(value);
            if *right {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect();
    cells.join("  ").trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
