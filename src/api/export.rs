use serde::Serialize;

use crate::core::{Metrics, YearRow};

pub const CSV_HEADER: &str = "year,volatile_return_pct,start_total,after_return_total,withdrawal,after_withdrawal_total,volatile_value,cash_value,total";

const TABLE_COLUMNS: [&str; 9] = [
    "Year",
    "Return %",
    "Start",
    "After return",
    "Withdrawal",
    "After withdrawal",
    "Volatile",
    "Cash",
    "Total",
];

fn row_cells(row: &YearRow) -> [String; 9] {
    [
        row.year.to_string(),
        format!("{:.2}", row.volatile_return_percent),
        format!("{:.2}", row.start_total),
        format!("{:.2}", row.after_return_total),
        format!("{:.2}", row.withdrawal),
        format!("{:.2}", row.after_withdrawal_total),
        format!("{:.2}", row.volatile_value),
        format!("{:.2}", row.cash_value),
        format!("{:.2}", row.total),
    ]
}

/// One exported line; money and percent columns carry two decimals.
#[derive(Debug, Serialize)]
struct CsvRow {
    year: i32,
    volatile_return_pct: String,
    start_total: String,
    after_return_total: String,
    withdrawal: String,
    after_withdrawal_total: String,
    volatile_value: String,
    cash_value: String,
    total: String,
}

impl From<&YearRow> for CsvRow {
    fn from(row: &YearRow) -> Self {
        Self {
            year: row.year,
            volatile_return_pct: format!("{:.2}", row.volatile_return_percent),
            start_total: format!("{:.2}", row.start_total),
            after_return_total: format!("{:.2}", row.after_return_total),
            withdrawal: format!("{:.2}", row.withdrawal),
            after_withdrawal_total: format!("{:.2}", row.after_withdrawal_total),
            volatile_value: format!("{:.2}", row.volatile_value),
            cash_value: format!("{:.2}", row.cash_value),
            total: format!("{:.2}", row.total),
        }
    }
}

/// Rows in year order, values rounded to two decimals as on screen. The
/// header is written even when `rows` is empty.
pub fn rows_to_csv(rows: &[YearRow]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(CSV_HEADER.len() + rows.len() * 96));
    writer.write_record(CSV_HEADER.split(','))?;
    for row in rows {
        writer.serialize(CsvRow::from(row))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn metrics_lines(metrics: &Metrics) -> Vec<String> {
    let irr = metrics
        .irr_percent
        .map(|v| format!("{v:.2}%"))
        .unwrap_or_else(|| "N/A".to_string());
    vec![
        format!("Total return:            {:.2}%", metrics.total_return_percent),
        format!("Annualized return:       {:.2}%", metrics.annualized_return_percent),
        format!("Max drawdown:            -{:.2}%", metrics.max_drawdown_percent),
        format!("Final value:             {:.2}", metrics.final_value),
        format!("Total withdrawn:         {:.2}", metrics.total_withdrawn),
        format!("IRR (with withdrawals):  {irr}"),
    ]
}

pub fn render_table(rows: &[YearRow], metrics: &Metrics) -> String {
    if rows.is_empty() {
        return "No years simulated.\n".to_string();
    }

    let cells: Vec<[String; 9]> = rows.iter().map(row_cells).collect();
    let mut widths = TABLE_COLUMNS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = TABLE_COLUMNS
        .iter()
        .zip(widths)
        .map(|(name, width)| format!("{name:>width$}"))
        .collect();
    out.push_str(&header.join("  "));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:>width$}"))
            .collect();
        out.push_str(&line.join("  "));
        out.push('\n');
    }

    out.push('\n');
    for line in metrics_lines(metrics) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}
