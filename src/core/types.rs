use serde::Serialize;

use super::returns::ReturnTable;

/// When the yearly withdrawal is taken relative to the year's return.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalTiming {
    /// Withdraw from the opening balance, before the return is applied.
    Start,
    /// Withdraw after the return is applied and before any rebalance.
    #[default]
    End,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum WithdrawalPolicy {
    #[default]
    None,
    /// Fixed currency amount per year.
    Fixed(f64),
    /// Fraction of the portfolio total at withdrawal time, in `[0, 1]`.
    Percent(f64),
}

impl WithdrawalPolicy {
    pub fn is_active(self) -> bool {
        !matches!(self, WithdrawalPolicy::None)
    }

    /// Requested amount for a portfolio worth `base`, before clamping.
    pub fn requested(self, base: f64) -> f64 {
        match self {
            WithdrawalPolicy::None => 0.0,
            WithdrawalPolicy::Fixed(amount) => amount,
            WithdrawalPolicy::Percent(fraction) => base * fraction,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub volatile_allocation: f64,
    pub cash_yield: f64,
    pub rebalance: bool,
    pub start_year: i32,
    pub end_year: i32,
    pub withdrawal_timing: WithdrawalTiming,
    pub withdrawal: WithdrawalPolicy,
    #[serde(skip)]
    pub returns: ReturnTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRow {
    pub year: i32,
    pub volatile_return_percent: f64,
    /// Portfolio value before anything happens in the year.
    pub start_total: f64,
    /// Portfolio value immediately after the year's returns.
    pub after_return_total: f64,
    /// Portfolio value once return and withdrawal are both applied, before rebalancing.
    pub after_withdrawal_total: f64,
    pub withdrawal: f64,
    pub volatile_value: f64,
    pub cash_value: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub final_value: f64,
    pub years: usize,
    pub total_return_percent: f64,
    pub annualized_return_percent: f64,
    pub max_drawdown_percent: f64,
    pub total_withdrawn: f64,
    /// `None` when no rate brackets a sign change of the cashflow NPV.
    pub irr_percent: Option<f64>,
}
