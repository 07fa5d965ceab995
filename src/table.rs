use std::borrow::Cow;
use std::fmt::Write as _;

/// Renders a plain-text table. Columns listed in `right_aligned` are padded on
/// the left, which keeps counts and durations lined up.
pub fn render_table(headers: &[String], rows: &[Vec<String>], right_aligned: &[usize]) -> String {
    let column_count = headers.len();
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(sanitize_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, right_aligned));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &separator_widths, &[]));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, right_aligned));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>], right_aligned: &[usize]) {
    print!("{}", render_table(headers, rows, right_aligned));
}

fn format_row(values: &[String], widths: &[usize], right_aligned: &[usize]) -> String {
    let cells = values
        .iter()
        .zip(widths.iter())
        .enumerate()
        .map(|(idx, (value, width))| {
            let cell = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(cell.chars().count()));
            if right_aligned.contains(&idx) {
                format!("{padding}{cell}")
            } else {
                format!("{cell}{padding}")
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
