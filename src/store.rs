//! Persistence collaborators.
//!
//! The core hands finished payslips and daily reports to a store
//! through the [`PayslipStore`] and [`ReportStore`] traits and never
//! reads them back during a calculation.  [`MemoryStore`] is the
//! in-process implementation used by the server and the tests.

use crate::error::StoreError;
use crate::models::{DailyReport, PayslipRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Receives issued payslips.
#[async_trait]
pub trait PayslipStore: Send + Sync {
    async fn save_payslip(&self, record: PayslipRecord) -> Result<(), StoreError>;
}

/// Receives daily reports created from chat messages.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn record_report(&self, report: DailyReport) -> Result<(), StoreError>;
}

/// Keeps records in memory, keyed by their generated id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    payslips: RwLock<HashMap<Uuid, PayslipRecord>>,
    reports: RwLock<HashMap<Uuid, DailyReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn payslip(&self, id: &Uuid) -> Result<PayslipRecord, StoreError> {
        self.payslips
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// A driver's payslips, newest period first.
    pub async fn payslips_for_driver(&self, driver_id: &str) -> Vec<PayslipRecord> {
        let mut found: Vec<PayslipRecord> = self
            .payslips
            .read()
            .await
            .values()
            .filter(|p| p.meta.driver_id == driver_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.meta.year, b.meta.month).cmp(&(a.meta.year, a.meta.month)));
        found
    }

    /// A driver's daily reports in date order.
    pub async fn reports_for_driver(&self, driver_id: &str) -> Vec<DailyReport> {
        let mut found: Vec<DailyReport> = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| r.driver_id == driver_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        found
    }
}

#[async_trait]
impl PayslipStore for MemoryStore {
    async fn save_payslip(&self, record: PayslipRecord) -> Result<(), StoreError> {
        self.payslips.write().await.insert(record.id, record);
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn record_report(&self, report: DailyReport) -> Result<(), StoreError> {
        self.reports.write().await.insert(report.id, report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeductionSet, PayslipMeta, PayslipResult, ReportSource};
    use chrono::{NaiveDate, Utc};

    fn payslip(driver_id: &str, year: i32, month: u32) -> PayslipRecord {
        PayslipRecord {
            id: Uuid::new_v4(),
            meta: PayslipMeta {
                driver_id: driver_id.into(),
                year,
                month,
                ..Default::default()
            },
            deductions: DeductionSet::default(),
            result: PayslipResult {
                lines: Vec::new(),
                subtotal: 0,
                consumption_tax: 0,
                tax_rate_percent: 10,
                work_total: 0,
                total_deductions: 0,
                net_pay: 0,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn payslips_are_listed_per_driver_newest_first() {
        let store = MemoryStore::new();
        store.save_payslip(payslip("d1", 2024, 4)).await.unwrap();
        store.save_payslip(payslip("d1", 2024, 5)).await.unwrap();
        store.save_payslip(payslip("d2", 2024, 5)).await.unwrap();

        let months: Vec<u32> = store
            .payslips_for_driver("d1")
            .await
            .iter()
            .map(|p| p.meta.month)
            .collect();
        assert_eq!(months, vec![5, 4]);
    }

    #[tokio::test]
    async fn payslip_lookup_by_id() {
        let store = MemoryStore::new();
        let record = payslip("d1", 2024, 5);
        let id = record.id;
        store.save_payslip(record).await.unwrap();
        assert_eq!(store.payslip(&id).await.unwrap().meta.month, 5);
        assert!(matches!(
            store.payslip(&Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reports_are_recorded() {
        let store = MemoryStore::new();
        let report = DailyReport {
            id: Uuid::new_v4(),
            driver_id: "d1".into(),
            driver_name: "山田太郎".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            work_details: Vec::new(),
            notes: String::new(),
            source: ReportSource::Line,
            created_at: Utc::now(),
        };
        store.record_report(report.clone()).await.unwrap();
        assert_eq!(store.reports_for_driver("d1").await, vec![report]);
        assert!(store.reports_for_driver("d2").await.is_empty());
    }
}
