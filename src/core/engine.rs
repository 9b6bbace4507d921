use tracing::debug;

use super::types::{SimulationConfig, WithdrawalPolicy, WithdrawalTiming, YearRow};

#[derive(Debug, Clone, Copy)]
struct Portfolio {
    volatile: f64,
    cash: f64,
}

impl Portfolio {
    fn seeded(config: &SimulationConfig) -> Self {
        let volatile = config.initial_capital * config.volatile_allocation;
        Self {
            volatile,
            cash: config.initial_capital - volatile,
        }
    }

    fn total(self) -> f64 {
        self.volatile + self.cash
    }

    fn apply_returns(&mut self, volatile_rate: f64, cash_yield: f64) {
        self.volatile *= 1.0 + volatile_rate;
        self.cash *= 1.0 + cash_yield;
    }

    /// Takes the policy's amount pro rata from both buckets and returns what
    /// was actually withdrawn. Requests are capped at the current total.
    fn withdraw(&mut self, policy: WithdrawalPolicy) -> f64 {
        let base = self.total();
        let amount = policy.requested(base).min(base).max(0.0);
        if amount <= 0.0 {
            return 0.0;
        }
        if amount >= base {
            self.volatile = 0.0;
            self.cash = 0.0;
            return amount;
        }

        let volatile_share = if base > 0.0 { self.volatile / base } else { 0.0 };
        self.volatile = (self.volatile - amount * volatile_share).max(0.0);
        self.cash = (self.cash - amount * (1.0 - volatile_share)).max(0.0);
        amount
    }

    fn rebalance(&mut self, volatile_allocation: f64) {
        let total = self.total().max(0.0);
        self.volatile = total * volatile_allocation;
        self.cash = total - self.volatile;
    }
}

/// Runs the backtest year by year over `start_year..=end_year`.
///
/// Within a year the order is: optional start-of-year withdrawal, returns,
/// optional end-of-year withdrawal, optional rebalance, snapshot. The run
/// stops after the first year whose closing total is zero.
pub fn simulate(config: &SimulationConfig) -> Vec<YearRow> {
    let mut portfolio = Portfolio::seeded(config);
    let span = i64::from(config.end_year) - i64::from(config.start_year) + 1;
    let capacity = span.clamp(0, 1_024) as usize;
    let mut rows = Vec::with_capacity(capacity);

    for year in config.start_year..=config.end_year {
        let start_total = portfolio.total();
        let mut withdrawal = 0.0;

        if config.withdrawal_timing == WithdrawalTiming::Start && config.withdrawal.is_active() {
            withdrawal = portfolio.withdraw(config.withdrawal);
        }

        let volatile_return_percent = config.returns.rate_percent(year);
        portfolio.apply_returns(config.returns.rate(year), config.cash_yield);
        let after_return_total = portfolio.total();

        if config.withdrawal_timing == WithdrawalTiming::End && config.withdrawal.is_active() {
            withdrawal = portfolio.withdraw(config.withdrawal);
        }
        let after_withdrawal_total = portfolio.total();

        if config.rebalance {
            portfolio.rebalance(config.volatile_allocation);
        }

        let total = portfolio.total();
        rows.push(YearRow {
            year,
            volatile_return_percent,
            start_total,
            after_return_total,
            after_withdrawal_total,
            withdrawal,
            volatile_value: portfolio.volatile,
            cash_value: portfolio.cash,
            total,
        });

        if total <= 0.0 {
            debug!(year, "portfolio depleted, stopping simulation");
            break;
        }
    }

    rows
}
