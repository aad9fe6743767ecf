//! Consumption tax extraction.
//!
//! Delivery unit prices are quoted tax inclusive, so the tax shown on a
//! payslip is the portion already contained in the subtotal rather than
//! an amount added on top.  The `TaxCalculator` trait keeps the rate and
//! rounding rule in one place so the engine can be driven with a
//! different rate (e.g. the reduced 8% rate) without touching it.

use crate::models::Yen;

/// Standard Japanese consumption tax rate, in percent.
pub const STANDARD_RATE_PERCENT: i64 = 10;

/// Computes the tax contained in a tax-inclusive amount.
///
/// Calculators must be thread‑safe (`Send + Sync`) because batch runs
/// invoke them from multiple threads.
pub trait TaxCalculator: Send + Sync {
    /// The rate applied, in whole percent.
    fn rate_percent(&self) -> i64;
    /// Returns the tax portion of `inclusive`.
    fn contained_tax(&self, inclusive: Yen) -> Yen;
}

/// Back-calculates tax from an inclusive total:
/// `round(inclusive * rate / (100 + rate))`, rounding halves away from
/// zero.
#[derive(Debug, Clone, Copy)]
pub struct InclusiveConsumptionTax {
    pub rate_percent: i64,
}

impl Default for InclusiveConsumptionTax {
    fn default() -> Self {
        Self {
            rate_percent: STANDARD_RATE_PERCENT,
        }
    }
}

impl TaxCalculator for InclusiveConsumptionTax {
    fn rate_percent(&self) -> i64 {
        self.rate_percent
    }

    fn contained_tax(&self, inclusive: Yen) -> Yen {
        round_div_half_away(
            i128::from(inclusive) * i128::from(self.rate_percent),
            i128::from(100 + self.rate_percent),
        )
    }
}

/// Integer division rounding to the nearest integer, halves away from
/// zero.  `den` must be positive.
pub fn round_div_half_away(num: i128, den: i128) -> Yen {
    let magnitude = (2 * num.abs() + den) / (2 * den);
    let signed = if num < 0 { -magnitude } else { magnitude };
    signed as Yen
}
