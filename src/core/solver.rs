use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrrSearchConfig {
    pub low: f64,
    pub high: f64,
    /// How many times `high` may be doubled while looking for a sign change.
    pub max_expansions: u32,
    pub high_limit: f64,
    pub iterations: u32,
}

impl Default for IrrSearchConfig {
    fn default() -> Self {
        Self {
            low: -0.9999,
            high: 10.0,
            max_expansions: 60,
            high_limit: 1e6,
            iterations: 100,
        }
    }
}

/// Net present value of `cashflows`, where index `i` is discounted `i` periods.
pub fn npv(cashflows: &[f64], rate: f64) -> f64 {
    let growth = 1.0 + rate;
    cashflows
        .iter()
        .enumerate()
        .map(|(i, cf)| cf / growth.powi(i as i32))
        .sum()
}

pub fn solve_irr(cashflows: &[f64]) -> Option<f64> {
    solve_irr_with(cashflows, IrrSearchConfig::default())
}

/// Finds the periodic rate at which `npv` is zero by bisection.
///
/// Returns `None` when no sign change can be bracketed, e.g. all cashflows
/// share a sign, and when every cashflow is zero (any rate would do). The bracket is narrowed a fixed number of times rather than
/// to a tolerance, so identical inputs always give identical rates.
pub fn solve_irr_with(cashflows: &[f64], config: IrrSearchConfig) -> Option<f64> {
    if cashflows.iter().all(|cf| *cf == 0.0) {
        return None;
    }

    let mut lo = config.low;
    let mut hi = config.high;
    let mut f_lo = npv(cashflows, lo);
    let mut f_hi = npv(cashflows, hi);

    let mut expansions = 0;
    while same_sign(f_lo, f_hi) && expansions < config.max_expansions {
        hi *= 2.0;
        f_hi = npv(cashflows, hi);
        expansions += 1;
        if hi > config.high_limit {
            debug!(hi, "irr search exceeded upper bound without a sign change");
            return None;
        }
    }
    // Long series overflow `npv(low)` to infinity; that still brackets a root.
    if same_sign(f_lo, f_hi) || f_lo.is_nan() || f_hi.is_nan() {
        debug!(f_lo, f_hi, "irr is not bracketed");
        return None;
    }

    for _ in 0..config.iterations {
        let mid = (lo + hi) * 0.5;
        let f_mid = npv(cashflows, mid);
        if f_mid == 0.0 {
            return Some(mid);
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }

    Some((lo + hi) * 0.5)
}

fn same_sign(a: f64, b: f64) -> bool {
    a * b > 0.0
}
