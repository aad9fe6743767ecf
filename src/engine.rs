//! Payslip computation engine.
//!
//! The `engine` module turns submitted work lines and a
//! [`DeductionSet`] into a [`PayslipResult`].  Two entry points exist:
//! [`calculate_payslip`] for submissions, which validates its input,
//! and [`preview`] for the live running total, which only fails when a
//! figure does not fit in [`Yen`].
//! Monthly runs for many drivers go through [`run_monthly_batch`],
//! which uses [`rayon`] to compute payslips in parallel.

use crate::error::{PayslipError, ValidationError};
use crate::models::{
    DeductionSet, Driver, LineInput, PayslipMeta, PayslipRecord, PayslipResult, WorkDetailLine,
    Yen,
};
use crate::registry::{DeliveryTypeRegistry, DriverDirectory};
use crate::tax::TaxCalculator;
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A form row as submitted: which delivery type and how many.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub delivery_type_id: String,
    pub quantity: u32,
}

/// Everything needed to issue one driver's payslip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayslipRequest {
    pub meta: PayslipMeta,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub deductions: DeductionSet,
}

/// Result of a monthly batch: issued payslips and the drivers whose
/// submission was rejected, each in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub issued: Vec<PayslipRecord>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub driver_id: String,
    pub driver_name: String,
    pub error: String,
}

/// Computes a payslip for submission.
///
/// Lines with quantity zero are dropped from the result.  Fails when no
/// line remains, when a price or deduction is negative, when an
/// other-deduction amount has no label, or when a figure overflows.
pub fn calculate_payslip(
    lines: &[LineInput],
    deductions: &DeductionSet,
    tax: &dyn TaxCalculator,
) -> Result<PayslipResult, PayslipError> {
    validate_deductions(deductions)?;
    let mut included = Vec::with_capacity(lines.len());
    for line in lines.iter().filter(|l| l.quantity > 0) {
        if line.unit_price < 0 {
            return Err(ValidationError::NegativeAmount {
                field: format!("unit_price ({})", line.delivery_type_name),
            }
            .into());
        }
        included.push(WorkDetailLine::try_from(line)?);
    }
    if included.is_empty() {
        return Err(ValidationError::NoWorkDetail.into());
    }
    Ok(compute(included, deductions, tax)?)
}

/// Computes the running figures shown while a form is being edited.
/// Zero-quantity lines are kept and contribute nothing; empty input
/// gives all-zero figures.  No other validation is applied.
pub fn preview(
    lines: &[LineInput],
    deductions: &DeductionSet,
    tax: &dyn TaxCalculator,
) -> Result<PayslipResult, ValidationError> {
    let lines = lines
        .iter()
        .map(WorkDetailLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    compute(lines, deductions, tax)
}

fn compute(
    lines: Vec<WorkDetailLine>,
    deductions: &DeductionSet,
    tax: &dyn TaxCalculator,
) -> Result<PayslipResult, ValidationError> {
    let out_of_range = |field: &str| ValidationError::AmountOutOfRange {
        field: field.to_string(),
    };
    let subtotal = lines
        .iter()
        .try_fold(0, |acc: Yen, l| acc.checked_add(l.amount))
        .ok_or_else(|| out_of_range("subtotal"))?;
    let consumption_tax = tax.contained_tax(subtotal);
    // Prices are tax inclusive; the tax figure is informational.
    let work_total = subtotal;
    let total_deductions = deductions.total()?;
    let net_pay = work_total
        .checked_sub(total_deductions)
        .ok_or_else(|| out_of_range("net_pay"))?;
    Ok(PayslipResult {
        lines,
        subtotal,
        consumption_tax,
        tax_rate_percent: tax.rate_percent(),
        work_total,
        total_deductions,
        net_pay,
    })
}

/// Takes the insurance and vehicle lease fees from the driver's record
/// when the submission leaves them at zero.
pub fn apply_driver_deductions(deductions: &mut DeductionSet, driver: &Driver) {
    if deductions.insurance_fee == 0 {
        deductions.insurance_fee = driver.insurance_fee;
    }
    if deductions.vehicle_lease_fee == 0 {
        deductions.vehicle_lease_fee = driver.vehicle_lease_fee;
    }
}

/// Applies [`apply_driver_deductions`] to every request whose driver is
/// in `drivers`.  Requests for unknown drivers are left as they are.
pub fn fill_driver_deductions(requests: &mut [PayslipRequest], drivers: &DriverDirectory) {
    for request in requests {
        if let Some(driver) = drivers.get(&request.meta.driver_id) {
            apply_driver_deductions(&mut request.deductions, driver);
        }
    }
}

/// Checks deduction amounts and the other-deduction label.
pub fn validate_deductions(deductions: &DeductionSet) -> Result<(), ValidationError> {
    if let Some((field, _)) = deductions.amounts().iter().find(|(_, v)| *v < 0) {
        return Err(ValidationError::NegativeAmount {
            field: (*field).to_string(),
        });
    }
    if deductions.other_deductions > 0 && deductions.other_deduction_name.trim().is_empty() {
        return Err(ValidationError::MissingOtherDeductionName);
    }
    Ok(())
}

/// Prices form rows with the unit prices current at submission time.
///
/// Rows with quantity zero are skipped without looking up their type.
/// The returned lines carry their own copy of name and price, so later
/// registry edits do not reach them.
pub fn resolve_lines(
    requests: &[LineRequest],
    registry: &DeliveryTypeRegistry,
) -> Result<Vec<LineInput>, ValidationError> {
    requests
        .iter()
        .filter(|r| r.quantity > 0)
        .map(|r| {
            let delivery_type = registry
                .get(&r.delivery_type_id)
                .ok_or_else(|| ValidationError::UnknownDeliveryType(r.delivery_type_id.clone()))?;
            Ok(LineInput {
                delivery_type_id: Some(delivery_type.id.clone()),
                delivery_type_name: delivery_type.name.clone(),
                quantity: r.quantity,
                unit_price: delivery_type.unit_price,
            })
        })
        .collect()
}

/// Computes a payslip and wraps it in a record ready for storage.
pub fn issue_payslip(
    request: PayslipRequest,
    tax: &dyn TaxCalculator,
) -> Result<PayslipRecord, PayslipError> {
    let result = calculate_payslip(&request.lines, &request.deductions, tax)?;
    Ok(PayslipRecord {
        id: Uuid::new_v4(),
        meta: request.meta,
        deductions: request.deductions,
        result,
        created_at: Utc::now(),
    })
}

/// Issues payslips for a whole period in parallel.
///
/// A rejected request does not stop the others; it is reported in
/// [`BatchOutcome::failures`].
pub fn run_monthly_batch(requests: Vec<PayslipRequest>, tax: &dyn TaxCalculator) -> BatchOutcome {
    let results: Vec<Result<PayslipRecord, BatchFailure>> = requests
        .into_par_iter()
        .map(|request| {
            let driver_id = request.meta.driver_id.clone();
            let driver_name = request.meta.driver_name.clone();
            issue_payslip(request, tax).map_err(|err| BatchFailure {
                driver_id,
                driver_name,
                error: err.to_string(),
            })
        })
        .collect();

    let mut outcome = BatchOutcome::default();
    for result in results {
        match result {
            Ok(record) => outcome.issued.push(record),
            Err(failure) => {
                tracing::warn!(driver = %failure.driver_name, error = %failure.error, "payslip rejected in batch");
                outcome.failures.push(failure);
            }
        }
    }
    outcome
}
