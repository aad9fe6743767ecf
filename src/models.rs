//! Data models for the Payslip Engine.
//!
//! The `models` module defines the serialisable structs shared by the
//! payslip calculator, the daily-report interpreter and the HTTP
//! surface.  Currency amounts are whole yen held in [`Yen`]; no
//! floating point is used for money anywhere in the crate.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A whole-yen currency amount.  Signed because net pay may go below
/// zero once deductions exceed the work total.
pub type Yen = i64;

/// A delivery category with its per-unit price, e.g. `"ヤマト宅急便"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryType {
    /// Opaque identifier assigned by the registry owner.
    pub id: String,
    /// Display name.  Unique by convention only.
    pub name: String,
    /// Price paid per delivered unit.
    pub unit_price: Yen,
    /// Soft-delete flag.  Inactive types are ignored by the matcher.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A freelance driver as seen by the core.  Only the fields needed for
/// payslip metadata, default deductions and chat-sender lookup are
/// modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// LINE user identifier linked by the driver, if any.
    #[serde(default)]
    pub line_user_id: Option<String>,
    /// Monthly insurance premium on the driver's vehicle.
    #[serde(default)]
    pub insurance_fee: Yen,
    /// Monthly lease fee for the vehicle.
    #[serde(default)]
    pub vehicle_lease_fee: Yen,
}

/// One line of work submitted for a payslip, before amounts are
/// computed.  The unit price is the price at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default)]
    pub delivery_type_id: Option<String>,
    pub delivery_type_name: String,
    pub quantity: u32,
    pub unit_price: Yen,
}

/// `quantity * unit_price`, or `None` when it does not fit in [`Yen`].
pub fn line_amount(quantity: u64, unit_price: Yen) -> Option<Yen> {
    Yen::try_from(quantity).ok()?.checked_mul(unit_price)
}

fn out_of_range(field: impl Into<String>) -> ValidationError {
    ValidationError::AmountOutOfRange {
        field: field.into(),
    }
}

/// A priced work line.  `amount` always equals `quantity * unit_price`;
/// build it through [`WorkDetailLine::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDetailLine {
    pub delivery_type_name: String,
    pub quantity: u32,
    pub unit_price: Yen,
    pub amount: Yen,
}

impl WorkDetailLine {
    pub fn new(
        delivery_type_name: impl Into<String>,
        quantity: u32,
        unit_price: Yen,
    ) -> Result<Self, ValidationError> {
        let delivery_type_name = delivery_type_name.into();
        let amount = line_amount(u64::from(quantity), unit_price)
            .ok_or_else(|| out_of_range(format!("amount ({delivery_type_name})")))?;
        Ok(Self {
            delivery_type_name,
            quantity,
            unit_price,
            amount,
        })
    }
}

impl TryFrom<&LineInput> for WorkDetailLine {
    type Error = ValidationError;

    fn try_from(input: &LineInput) -> Result<Self, Self::Error> {
        WorkDetailLine::new(input.delivery_type_name.clone(), input.quantity, input.unit_price)
    }
}

/// Deductions subtracted from the work total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeductionSet {
    /// Bank transfer fee.
    pub transfer_fee: Yen,
    /// Insurance premium.
    pub insurance_fee: Yen,
    /// Vehicle lease fee.
    pub vehicle_lease_fee: Yen,
    /// Advance already paid out during the period.
    pub advance_payment: Yen,
    /// Label for `other_deductions`.  Required when that amount is
    /// non-zero.
    pub other_deduction_name: String,
    /// Free-form extra deduction.
    pub other_deductions: Yen,
}

impl DeductionSet {
    /// Sum of every deduction amount.
    pub fn total(&self) -> Result<Yen, ValidationError> {
        self.amounts()
            .iter()
            .try_fold(0, |acc: Yen, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| out_of_range("total_deductions"))
    }

    pub(crate) fn amounts(&self) -> [(&'static str, Yen); 5] {
        [
            ("transfer_fee", self.transfer_fee),
            ("insurance_fee", self.insurance_fee),
            ("vehicle_lease_fee", self.vehicle_lease_fee),
            ("advance_payment", self.advance_payment),
            ("other_deductions", self.other_deductions),
        ]
    }
}

/// The computed figures of one payslip.  Produced once per calculation
/// and never recomputed afterwards, so later price edits do not change
/// an issued payslip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipResult {
    /// Snapshot of the priced lines, in submission order.
    pub lines: Vec<WorkDetailLine>,
    /// Sum of all line amounts (tax inclusive).
    pub subtotal: Yen,
    /// Consumption tax contained in `subtotal`.  Informational only.
    pub consumption_tax: Yen,
    /// Rate used for `consumption_tax`, in percent.
    pub tax_rate_percent: i64,
    /// Equal to `subtotal`.
    pub work_total: Yen,
    pub total_deductions: Yen,
    /// `work_total - total_deductions`; may be negative.
    pub net_pay: Yen,
}

/// Display and storage metadata attached to a payslip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayslipMeta {
    pub driver_id: String,
    pub driver_name: String,
    pub company_name: String,
    pub center_name: String,
    pub year: i32,
    pub month: u32,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub notes: String,
}

/// A payslip as handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayslipRecord {
    pub id: Uuid,
    pub meta: PayslipMeta,
    pub deductions: DeductionSet,
    pub result: PayslipResult,
    pub created_at: DateTime<Utc>,
}

/// A `label quantity` pair read from a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReportLine {
    pub raw_type_name: String,
    pub quantity: u64,
}

/// A parsed line resolved against a [`DeliveryType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedReportLine {
    pub delivery_type_id: String,
    pub delivery_type_name: String,
    pub quantity: u64,
    pub unit_price: Yen,
    pub amount: Yen,
}

impl MatchedReportLine {
    pub fn new(delivery_type: &DeliveryType, quantity: u64) -> Result<Self, ValidationError> {
        let amount = line_amount(quantity, delivery_type.unit_price)
            .ok_or_else(|| out_of_range(format!("amount ({})", delivery_type.name)))?;
        Ok(Self {
            delivery_type_id: delivery_type.id.clone(),
            delivery_type_name: delivery_type.name.clone(),
            quantity,
            unit_price: delivery_type.unit_price,
            amount,
        })
    }
}

/// Where a daily report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Submitted through the LINE bot.
    Line,
}

/// One driver's deliveries for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub id: Uuid,
    pub driver_id: String,
    pub driver_name: String,
    pub date: NaiveDate,
    pub work_details: Vec<MatchedReportLine>,
    pub notes: String,
    pub source: ReportSource,
    pub created_at: DateTime<Utc>,
}

impl DailyReport {
    /// Total delivered units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.work_details
            .iter()
            .fold(0, |acc, d| acc.saturating_add(d.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_line_amount_is_quantity_times_price() {
        let line = WorkDetailLine::new("ヤマト", 37, 165).unwrap();
        assert_eq!(line.amount, 6105);
        let zero = WorkDetailLine::new("佐川", 0, 200).unwrap();
        assert_eq!(zero.amount, 0);
    }

    #[test]
    fn work_line_amount_out_of_range_is_rejected() {
        let err = WorkDetailLine::new("ヤマト", 3, i64::MAX / 2).unwrap_err();
        assert!(matches!(err, ValidationError::AmountOutOfRange { .. }));
        assert_eq!(line_amount(u64::MAX, 1), None);
        assert_eq!(line_amount(2, -5), Some(-10));
    }

    #[test]
    fn matched_line_amount_out_of_range_is_rejected() {
        let t = DeliveryType {
            id: "t1".into(),
            name: "ヤマト".into(),
            unit_price: 160,
            active: true,
        };
        assert_eq!(MatchedReportLine::new(&t, 5_000_000_000).unwrap().amount, 800_000_000_000);
        assert!(MatchedReportLine::new(&t, 99_999_999_999_999_999).is_err());
    }

    #[test]
    fn deduction_total_sums_every_amount() {
        let deductions = DeductionSet {
            transfer_fee: 440,
            insurance_fee: 3000,
            vehicle_lease_fee: 25000,
            advance_payment: 10000,
            other_deduction_name: "駐車場".into(),
            other_deductions: 5000,
        };
        assert_eq!(deductions.total().unwrap(), 43440);
    }

    #[test]
    fn deduction_total_overflow_is_rejected() {
        let deductions = DeductionSet {
            transfer_fee: i64::MAX,
            insurance_fee: 1,
            ..Default::default()
        };
        assert_eq!(
            deductions.total(),
            Err(ValidationError::AmountOutOfRange {
                field: "total_deductions".into()
            })
        );
    }

    #[test]
    fn driver_deduction_fields_default_to_zero() {
        let d: Driver = serde_json::from_str(r#"{"id":"d1","name":"佐藤"}"#).unwrap();
        assert_eq!(d.insurance_fee, 0);
        assert_eq!(d.vehicle_lease_fee, 0);
    }

    #[test]
    fn delivery_type_defaults_to_active() {
        let t: DeliveryType =
            serde_json::from_str(r#"{"id":"t1","name":"ネコポス","unit_price":80}"#).unwrap();
        assert!(t.active);
    }
}
