use std::ops::Deref;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

/// One sale as read from the dataset, with calendar fields derived at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub invoice_id: Option<String>,
    pub branch: String,
    pub city: String,
    pub customer_type: String,
    pub gender: String,
    pub product_line: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub tax: f64,
    pub total: f64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub payment: String,
    pub cogs: Option<f64>,
    pub gross_margin_percentage: Option<f64>,
    pub gross_income: f64,
    pub rating: f64,
    /// First day of the month `date` falls in.
    pub month: NaiveDate,
    pub day: u32,
    pub hour: u32,
}

/// Ordered, read-only sequence of records. Clones share the same allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    records: Arc<[TransactionRecord]>,
}

impl RecordSet {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn as_slice(&self) -> &[TransactionRecord] {
        &self.records
    }
}

impl Deref for RecordSet {
    type Target = [TransactionRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a TransactionRecord;
    type IntoIter = std::slice::Iter<'a, TransactionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Headline figures shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub transactions: usize,
    pub total_revenue: f64,
    pub total_quantity: u64,
    pub average_rating: Option<f64>,
    pub gross_income: f64,
}

impl Kpis {
    pub fn compute(records: &[TransactionRecord]) -> Self {
        let mut total_revenue = 0.0;
        let mut total_quantity = 0u64;
        let mut rating_sum = 0.0;
        let mut gross_income = 0.0;

        for record in records {
            total_revenue += record.total;
            total_quantity += u64::from(record.quantity);
            rating_sum += record.rating;
            gross_income += record.gross_income;
        }

        Self {
            transactions: records.len(),
            total_revenue,
            total_quantity,
            average_rating: if records.is_empty() {
                None
            } else {
                Some(rating_sum / records.len() as f64)
            },
            gross_income,
        }
    }
}
