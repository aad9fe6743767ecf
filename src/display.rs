//! Presentation helpers and the rendering hand-off.
//!
//! Nothing here computes money.  [`PayslipDocument`] copies the stored
//! figures of a [`PayslipRecord`] into display strings so the PDF
//! renderer, the on-screen view and the email all show the same
//! numbers.

use crate::models::{PayslipRecord, Yen};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Formats whole yen with thousands separators: `¥12,345`, `-¥3,000`.
pub fn format_yen(amount: Yen) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

/// `2024/05/01`, or an empty string when the date is unset.
pub fn format_period_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y/%m/%d").to_string())
        .unwrap_or_default()
}

/// A work line with pre-formatted figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub amount: String,
}

/// A labelled deduction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub label: String,
    pub amount: String,
}

/// Everything a renderer needs to lay out one payslip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipDocument {
    pub title: String,
    pub driver_name: String,
    pub company_name: String,
    pub center_name: String,
    /// `2024年5月`
    pub period_label: String,
    /// `2024/05/01 〜 2024/05/31`
    pub period_range: String,
    pub lines: Vec<DocumentLine>,
    /// `内消費税（10%対象）`
    pub tax_label: String,
    pub consumption_tax: String,
    /// `作業合計（税込10%対象）`
    pub work_total_label: String,
    pub work_total: String,
    /// Only deductions with a positive amount are listed.
    pub deductions: Vec<DocumentRow>,
    pub total_deductions: String,
    pub net_pay: String,
    pub notes: String,
}

impl PayslipDocument {
    pub fn from_record(record: &PayslipRecord) -> Self {
        let meta = &record.meta;
        let d = &record.deductions;
        let r = &record.result;

        let mut deductions = Vec::new();
        for (label, amount) in [
            ("振込手数料", d.transfer_fee),
            ("保険料", d.insurance_fee),
            ("車両リース代", d.vehicle_lease_fee),
            ("前借り", d.advance_payment),
        ] {
            if amount > 0 {
                deductions.push(DocumentRow {
                    label: label.to_string(),
                    amount: format_yen(amount),
                });
            }
        }
        if !d.other_deduction_name.is_empty() && d.other_deductions > 0 {
            deductions.push(DocumentRow {
                label: d.other_deduction_name.clone(),
                amount: format_yen(d.other_deductions),
            });
        }

        Self {
            title: format!("給料明細書 - {}", meta.driver_name),
            driver_name: meta.driver_name.clone(),
            company_name: meta.company_name.clone(),
            center_name: meta.center_name.clone(),
            period_label: format!("{}年{}月", meta.year, meta.month),
            period_range: format!(
                "{} 〜 {}",
                format_period_date(meta.period_start),
                format_period_date(meta.period_end)
            ),
            lines: r
                .lines
                .iter()
                .map(|l| DocumentLine {
                    name: l.delivery_type_name.clone(),
                    quantity: l.quantity,
                    unit_price: format_yen(l.unit_price),
                    amount: format_yen(l.amount),
                })
                .collect(),
            tax_label: format!("内消費税（{}%対象）", r.tax_rate_percent),
            consumption_tax: format_yen(r.consumption_tax),
            work_total_label: format!("作業合計（税込{}%対象）", r.tax_rate_percent),
            work_total: format_yen(r.work_total),
            deductions,
            total_deductions: format_yen(r.total_deductions),
            net_pay: format_yen(r.net_pay),
            notes: meta.notes.clone(),
        }
    }
}

pub fn payslip_email_subject(record: &PayslipRecord) -> String {
    format!(
        "【給料明細】{}年{}月分 - {}様",
        record.meta.year, record.meta.month, record.meta.driver_name
    )
}

/// Plain-text body sent with the PDF attachment.  A non-blank
/// `custom_message` is appended as its own paragraph.
pub fn payslip_email_body(record: &PayslipRecord, custom_message: Option<&str>) -> String {
    let meta = &record.meta;
    let mut body = format!(
        "{name} 様\n\nお疲れ様です。\n{year}年{month}月分の給料明細をお送りいたします。\n\n\
         ご確認のほど、よろしくお願いいたします。\n\n【支給額】\n差引支給額: {net}\n\n\
         集計期間: {start} 〜 {end}",
        name = meta.driver_name,
        year = meta.year,
        month = meta.month,
        net = format_yen(record.result.net_pay),
        start = format_period_date(meta.period_start),
        end = format_period_date(meta.period_end),
    );
    if let Some(message) = custom_message.map(str::trim).filter(|m| !m.is_empty()) {
        body.push_str("\n\n");
        body.push_str(message);
    }
    body
}
