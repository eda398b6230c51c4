//! Plain-text rendering of a result snapshot.

use crate::snapshot::{ResultSnapshot, TestState};
use crate::walker::depth_first;

const HEADER: [&str; COLUMNS] = ["", "ops/sec", "MoE", "samples", "relative"];
const COLUMNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// Cell text for values that do not exist yet
    pub placeholder: String,
    /// Prepended once per nesting level
    pub indent: String,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            placeholder: "--".to_string(),
            indent: "  ".to_string(),
        }
    }
}

enum Row {
    Label(String),
    Cells([String; COLUMNS]),
}

/// Render group snapshots as an aligned table.
///
/// Each group contributes its label and one row per test it directly
/// contains. The relative column compares a test against the slowest measured
/// test of the same group, so `1.00` marks the slowest sibling.
pub fn format_result_table(roots: &[ResultSnapshot], options: &TableOptions) -> String {
    let mut rows = vec![Row::Cells(HEADER.map(String::from))];

    depth_first(roots, |visit| {
        let ResultSnapshot::Group { name, children } = visit.node else {
            return;
        };

        rows.push(Row::Label(format!("{}{}", options.indent.repeat(visit.depth - 1), name)));

        let tests: Vec<_> = children.iter().filter_map(ResultSnapshot::as_test).collect();
        let slowest = tests
            .iter()
            .filter_map(|test| test.state.figures())
            .map(|figures| figures.ops_per_second)
            .reduce(f64::min);

        let indent = options.indent.repeat(visit.depth);
        for test in tests {
            let name = format!("{}{}", indent, test.name);
            let cells = match &test.state {
                TestState::Initialized => {
                    let none = || options.placeholder.clone();
                    [name, none(), none(), none(), none()]
                }
                TestState::Running(figures) | TestState::Finished(figures) => {
                    let relative = match slowest {
                        Some(slowest) if slowest > 0.0 => {
                            fixed(figures.ops_per_second / slowest, 2, &options.placeholder)
                        }
                        _ => options.placeholder.clone(),
                    };
                    [
                        name,
                        fixed(figures.ops_per_second, 0, &options.placeholder),
                        fixed(figures.relative_margin_of_error, 2, &options.placeholder),
                        fixed(figures.sample_count as f64, 0, &options.placeholder),
                        relative,
                    ]
                }
            };
            rows.push(Row::Cells(cells));
        }
    });

    // labels are printed as they are and never widen a column
    let mut widths = [width(&options.placeholder); COLUMNS];
    widths[0] = 0;
    for row in &rows {
        if let Row::Cells(cells) = row {
            for (slot, cell) in widths.iter_mut().zip(cells) {
                *slot = (*slot).max(width(cell));
            }
        }
    }

    rows.iter()
        .map(|row| match row {
            Row::Label(label) => label.clone(),
            Row::Cells(cells) => cells
                .iter()
                .zip(widths)
                .enumerate()
                .map(|(column, (cell, pad))| {
                    if column == 0 {
                        format!("{:<pad$}", cell)
                    } else {
                        format!("{:>pad$}", cell)
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn width(text: &str) -> usize {
    text.chars().count()
}

/// `value` with exactly `decimals` fraction digits, thousands grouped and
/// halves rounded away from zero.
fn fixed(value: f64, decimals: u32, placeholder: &str) -> String {
    if !value.is_finite() {
        return placeholder.to_string();
    }

    let scale = 10u128.pow(decimals);
    let scaled = (value.abs() * scale as f64).round() as u128;
    let whole = group_thousands(&(scaled / scale).to_string());
    let sign = if value < 0.0 && scaled > 0 { "-" } else { "" };

    if decimals == 0 {
        format!("{sign}{whole}")
    } else {
        let fraction = scaled % scale;
        format!("{sign}{whole}.{fraction:0>width$}", width = decimals as usize)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
