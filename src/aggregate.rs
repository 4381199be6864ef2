use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::models::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Branch,
    City,
    CustomerType,
    Gender,
    ProductLine,
    Payment,
    Date,
    Month,
    Day,
    Hour,
}

impl GroupKey {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKey::Branch => "Branch",
            GroupKey::City => "City",
            GroupKey::CustomerType => "Customer type",
            GroupKey::Gender => "Gender",
            GroupKey::ProductLine => "Product line",
            GroupKey::Payment => "Payment",
            GroupKey::Date => "Date",
            GroupKey::Month => "Month",
            GroupKey::Day => "Day",
            GroupKey::Hour => "Hour",
        }
    }

    fn value(&self, record: &TransactionRecord) -> KeyValue {
        match self {
            GroupKey::Branch => KeyValue::Text(record.branch.clone()),
            GroupKey::City => KeyValue::Text(record.city.clone()),
            GroupKey::CustomerType => KeyValue::Text(record.customer_type.clone()),
            GroupKey::Gender => KeyValue::Text(record.gender.clone()),
            GroupKey::ProductLine => KeyValue::Text(record.product_line.clone()),
            GroupKey::Payment => KeyValue::Text(record.payment.clone()),
            GroupKey::Date => KeyValue::Date(record.date),
            GroupKey::Month => KeyValue::Date(record.month),
            GroupKey::Day => KeyValue::Number(record.day),
            GroupKey::Hour => KeyValue::Number(record.hour),
        }
    }
}

impl FromStr for GroupKey {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self> {
        let key = match name {
            "Branch" => GroupKey::Branch,
            "City" => GroupKey::City,
            "Customer type" => GroupKey::CustomerType,
            "Gender" => GroupKey::Gender,
            "Product line" => GroupKey::ProductLine,
            "Payment" => GroupKey::Payment,
            "Date" => GroupKey::Date,
            "Month" => GroupKey::Month,
            "Day" => GroupKey::Day,
            "Hour" => GroupKey::Hour,
            other => return Err(PipelineError::UnknownGroupKey(other.to_string())),
        };
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Quantity,
    UnitPrice,
    Tax,
    Total,
    Cogs,
    GrossMarginPercentage,
    GrossIncome,
    Rating,
}

impl Measure {
    pub fn name(&self) -> &'static str {
        match self {
            Measure::Quantity => "Quantity",
            Measure::UnitPrice => "Unit price",
            Measure::Tax => "Tax 5%",
            Measure::Total => "Total",
            Measure::Cogs => "cogs",
            Measure::GrossMarginPercentage => "gross margin percentage",
            Measure::GrossIncome => "gross income",
            Measure::Rating => "Rating",
        }
    }

    fn value(&self, record: &TransactionRecord) -> Option<f64> {
        match self {
            Measure::Quantity => Some(f64::from(record.quantity)),
            Measure::UnitPrice => Some(record.unit_price),
            Measure::Tax => Some(record.tax),
            Measure::Total => Some(record.total),
            Measure::Cogs => record.cogs,
            Measure::GrossMarginPercentage => record.gross_margin_percentage,
            Measure::GrossIncome => Some(record.gross_income),
            Measure::Rating => Some(record.rating),
        }
    }
}

impl FromStr for Measure {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self> {
        let measure = match name {
            "Quantity" => Measure::Quantity,
            "Unit price" => Measure::UnitPrice,
            "Tax 5%" | "Tax" => Measure::Tax,
            "Total" => Measure::Total,
            "cogs" => Measure::Cogs,
            "gross margin percentage" => Measure::GrossMarginPercentage,
            "gross income" => Measure::GrossIncome,
            "Rating" => Measure::Rating,
            other => return Err(PipelineError::UnknownMeasure(other.to_string())),
        };
        Ok(measure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Mean,
    Count,
    /// Group row count over the total row count.
    Share,
}

impl Reduction {
    fn suffix(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Count => "count",
            Reduction::Share => "share",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Aggregation {
    measure: Option<Measure>,
    reduction: Reduction,
}

impl Aggregation {
    fn column(&self) -> String {
        match self.measure {
            Some(measure) => format!("{} ({})", measure.name(), self.reduction.suffix()),
            None => self.reduction.suffix().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RowOrder {
    Natural,
    Descending(usize),
}

/// Names a grouped reduction. Built from column names so wiring mistakes
/// surface as `UnknownGroupKey` / `UnknownMeasure`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    name: String,
    group_by: Vec<GroupKey>,
    aggregations: Vec<Aggregation>,
    order: RowOrder,
}

impl AggregateSpec {
    /// Groups by one or two keys.
    pub fn new(name: impl Into<String>, group_by: &[&str]) -> Result<Self> {
        if !(1..=2).contains(&group_by.len()) {
            return Err(PipelineError::UnknownGroupKey(format!(
                "[{}] (expected one or two keys)",
                group_by.join(", ")
            )));
        }
        let group_by = group_by
            .iter()
            .map(|key| key.parse())
            .collect::<Result<Vec<GroupKey>>>()?;
        Ok(Self {
            name: name.into(),
            group_by,
            aggregations: Vec::new(),
            order: RowOrder::Natural,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn measure(mut self, measure: &str, reduction: Reduction) -> Result<Self> {
        let measure = measure.parse::<Measure>()?;
        self.aggregations.push(Aggregation {
            measure: Some(measure),
            reduction,
        });
        Ok(self)
    }

    pub fn sum(self, measure: &str) -> Result<Self> {
        self.measure(measure, Reduction::Sum)
    }

    pub fn mean(self, measure: &str) -> Result<Self> {
        self.measure(measure, Reduction::Mean)
    }

    pub fn count(mut self) -> Self {
        self.aggregations.push(Aggregation {
            measure: None,
            reduction: Reduction::Count,
        });
        self
    }

    pub fn share(mut self) -> Self {
        self.aggregations.push(Aggregation {
            measure: None,
            reduction: Reduction::Share,
        });
        self
    }

    /// Orders rows by a value column, largest first. `column` is either the
    /// full column label or a measure name with a single aggregation.
    pub fn descending_by(mut self, column: &str) -> Result<Self> {
        let index = self
            .aggregations
            .iter()
            .position(|agg| agg.column() == column)
            .or_else(|| {
                let measure = column.parse::<Measure>().ok()?;
                let mut matching = self
                    .aggregations
                    .iter()
                    .enumerate()
                    .filter(|(_, agg)| agg.measure == Some(measure));
                match (matching.next(), matching.next()) {
                    (Some((index, _)), None) => Some(index),
                    _ => None,
                }
            })
            .ok_or_else(|| PipelineError::UnknownMeasure(column.to_string()))?;
        self.order = RowOrder::Descending(index);
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Text(String),
    Date(NaiveDate),
    Number(u32),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Text(text) => f.write_str(text),
            KeyValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            KeyValue::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<KeyValue>,
    /// One entry per value column. `None` is a mean with nothing to average.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub name: String,
    pub key_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    rows: usize,
    sums: Vec<f64>,
    counts: Vec<usize>,
}

/// Groups `records` by the spec's key and reduces each aggregation. Only
/// groups present in `records` appear in the result.
pub fn aggregate(records: &[TransactionRecord], spec: &AggregateSpec) -> AggregateTable {
    let width = spec.aggregations.len();
    let mut groups: BTreeMap<Vec<KeyValue>, Accumulator> = BTreeMap::new();

    for record in records {
        let key = spec.group_by.iter().map(|group| group.value(record)).collect();
        let entry = groups.entry(key).or_insert_with(|| Accumulator {
            rows: 0,
            sums: vec![0.0; width],
            counts: vec![0; width],
        });
        entry.rows += 1;
        for (index, aggregation) in spec.aggregations.iter().enumerate() {
            if let Some(value) = aggregation.measure.and_then(|m| m.value(record)) {
                entry.sums[index] += value;
                entry.counts[index] += 1;
            }
        }
    }

    let total_rows = records.len();
    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(key, acc)| AggregateRow {
            key,
            values: spec
                .aggregations
                .iter()
                .enumerate()
                .map(|(index, aggregation)| match aggregation.reduction {
                    Reduction::Sum => Some(acc.sums[index]),
                    Reduction::Mean => {
                        if acc.counts[index] == 0 {
                            None
                        } else {
                            Some(acc.sums[index] / acc.counts[index] as f64)
                        }
                    }
                    Reduction::Count => Some(acc.rows as f64),
                    Reduction::Share => Some(acc.rows as f64 / total_rows as f64),
                })
                .collect(),
        })
        .collect();

    if let RowOrder::Descending(index) = spec.order {
        rows.sort_by(|a, b| {
            let left = a.values[index].unwrap_or(f64::NEG_INFINITY);
            let right = b.values[index].unwrap_or(f64::NEG_INFINITY);
            right.total_cmp(&left)
        });
    }

    AggregateTable {
        name: spec.name().to_string(),
        key_columns: spec.group_by.iter().map(|key| key.name().to_string()).collect(),
        value_columns: spec.aggregations.iter().map(Aggregation::column).collect(),
        rows,
    }
}
