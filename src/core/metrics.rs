use super::solver::solve_irr;
use super::types::{Metrics, YearRow};

/// Summarises a finished run. An empty run yields `Metrics::default()`.
pub fn compute_metrics(rows: &[YearRow], initial_capital: f64) -> Metrics {
    let Some(last) = rows.last() else {
        return Metrics::default();
    };
    let final_value = last.total;
    let years = rows.len();

    let total_return = if initial_capital > 0.0 {
        (final_value - initial_capital) / initial_capital
    } else {
        0.0
    };
    let annualized_return_percent = if initial_capital > 0.0 {
        annualized_return(total_return, years) * 100.0
    } else {
        0.0
    };

    let irr_percent = solve_irr(&irr_cashflows(rows, initial_capital)).map(|rate| rate * 100.0);

    Metrics {
        final_value,
        years,
        total_return_percent: total_return * 100.0,
        annualized_return_percent,
        max_drawdown_percent: max_drawdown(rows, initial_capital) * 100.0,
        total_withdrawn: rows.iter().map(|row| row.withdrawal).sum(),
        irr_percent,
    }
}

/// Geometric mean yearly return; a growth factor at or below zero maps to -100%.
fn annualized_return(total_return: f64, years: usize) -> f64 {
    let growth = 1.0 + total_return;
    if growth <= 0.0 || years == 0 {
        return -1.0;
    }
    growth.powf(1.0 / years as f64) - 1.0
}

/// Largest peak-to-trough decline as a fraction in `[0, 1]`. The running
/// peak starts at the initial capital.
pub fn max_drawdown(rows: &[YearRow], initial_capital: f64) -> f64 {
    let mut peak = initial_capital;
    let mut max_dd: f64 = 0.0;
    for row in rows {
        peak = peak.max(row.total);
        if peak > 0.0 {
            let dd = ((peak - row.total) / peak).clamp(0.0, 1.0);
            max_dd = max_dd.max(dd);
        }
    }
    max_dd
}

/// `C[0] = -initial`, `C[i] = withdrawal of year i`, with the closing value
/// added to the last year as a liquidating flow.
pub fn irr_cashflows(rows: &[YearRow], initial_capital: f64) -> Vec<f64> {
    let mut cashflows = Vec::with_capacity(rows.len() + 1);
    cashflows.push(-initial_capital);
    cashflows.extend(rows.iter().map(|row| row.withdrawal));
    if let (Some(last_flow), Some(last_row)) = (cashflows.last_mut(), rows.last()) {
        *last_flow += last_row.total;
    }
    cashflows
}
