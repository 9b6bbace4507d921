mod engine;
mod metrics;
mod returns;
mod solver;
mod types;

pub use engine::simulate;
pub use metrics::{compute_metrics, irr_cashflows, max_drawdown};
pub use returns::{AnnualReturn, ReturnTable, ReturnsParseError};
pub use solver::{IrrSearchConfig, npv, solve_irr, solve_irr_with};
pub use types::{Metrics, SimulationConfig, WithdrawalPolicy, WithdrawalTiming, YearRow};
