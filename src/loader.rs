use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{RecordSet, TransactionRecord};

const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];
const TIME_FORMAT: &str = "%H:%M";
const RATING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Header row written by [`serialize`], in dataset order.
const HEADER: [&str; 17] = [
    "Invoice ID",
    "Branch",
    "City",
    "Customer type",
    "Gender",
    "Product line",
    "Unit price",
    "Quantity",
    "Tax 5%",
    "Total",
    "Date",
    "Time",
    "Payment",
    "cogs",
    "gross margin percentage",
    "gross income",
    "Rating",
];

/// Columns a source must carry. Each entry lists accepted spellings.
const REQUIRED_COLUMNS: [&[&str]; 14] = [
    &["Branch"],
    &["City"],
    &["Customer type"],
    &["Gender"],
    &["Product line"],
    &["Unit price"],
    &["Quantity"],
    &["Tax 5%", "Tax"],
    &["Total"],
    &["Date"],
    &["Time"],
    &["Payment"],
    &["gross income"],
    &["Rating"],
];

#[derive(Debug, Serialize, Deserialize)]
struct SalesRow {
    #[serde(rename = "Invoice ID", default)]
    invoice_id: Option<String>,
    #[serde(rename = "Branch")]
    branch: String,
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "Customer type")]
    customer_type: String,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Product line")]
    product_line: String,
    #[serde(rename = "Unit price")]
    unit_price: f64,
    #[serde(rename = "Quantity")]
    quantity: u32,
    #[serde(rename = "Tax 5%", alias = "Tax")]
    tax: f64,
    #[serde(rename = "Total")]
    total: f64,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Payment")]
    payment: String,
    #[serde(rename = "cogs", default)]
    cogs: Option<f64>,
    #[serde(rename = "gross margin percentage", default)]
    gross_margin_percentage: Option<f64>,
    #[serde(rename = "gross income")]
    gross_income: f64,
    #[serde(rename = "Rating")]
    rating: f64,
}

impl From<&TransactionRecord> for SalesRow {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            invoice_id: record.invoice_id.clone(),
            branch: record.branch.clone(),
            city: record.city.clone(),
            customer_type: record.customer_type.clone(),
            gender: record.gender.clone(),
            product_line: record.product_line.clone(),
            unit_price: record.unit_price,
            quantity: record.quantity,
            tax: record.tax,
            total: record.total,
            date: record.date.format("%-m/%-d/%Y").to_string(),
            time: record.time.format(TIME_FORMAT).to_string(),
            payment: record.payment.clone(),
            cogs: record.cogs,
            gross_margin_percentage: record.gross_margin_percentage,
            gross_income: record.gross_income,
            rating: record.rating,
        }
    }
}

impl SalesRow {
    fn into_record(self, line: u64) -> Result<TransactionRecord> {
        let date = parse_date(&self.date).ok_or_else(|| {
            PipelineError::data_format(
                line,
                "Date",
                format!("`{}` is not a month/day/year date", self.date),
            )
        })?;
        let time = NaiveTime::parse_from_str(&self.time, TIME_FORMAT).map_err(|_| {
            PipelineError::data_format(line, "Time", format!("`{}` is not an HH:MM time", self.time))
        })?;

        check_amount(line, "Unit price", self.unit_price)?;
        check_finite(line, "Tax 5%", self.tax)?;
        check_amount(line, "Total", self.total)?;
        check_amount(line, "gross income", self.gross_income)?;
        if let Some(cogs) = self.cogs {
            check_finite(line, "cogs", cogs)?;
        }
        if let Some(margin) = self.gross_margin_percentage {
            check_finite(line, "gross margin percentage", margin)?;
        }
        if !RATING_RANGE.contains(&self.rating) {
            return Err(PipelineError::data_format(
                line,
                "Rating",
                format!("{} is outside 0-10", self.rating),
            ));
        }

        Ok(TransactionRecord {
            invoice_id: self.invoice_id,
            branch: self.branch,
            city: self.city,
            customer_type: self.customer_type,
            gender: self.gender,
            product_line: self.product_line,
            unit_price: self.unit_price,
            quantity: self.quantity,
            tax: self.tax,
            total: self.total,
            month: date - Days::new(u64::from(date.day0())),
            day: date.day(),
            hour: time.hour(),
            date,
            time,
            payment: self.payment,
            cogs: self.cogs,
            gross_margin_percentage: self.gross_margin_percentage,
            gross_income: self.gross_income,
            rating: self.rating,
        })
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

fn check_finite(line: u64, column: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::data_format(line, column, format!("{value} is not a finite number")))
    }
}

fn check_amount(line: u64, column: &str, value: f64) -> Result<()> {
    check_finite(line, column, value)?;
    if value < 0.0 {
        return Err(PipelineError::data_format(line, column, format!("{value} is negative")));
    }
    Ok(())
}

fn check_columns(headers: &csv::StringRecord) -> Result<()> {
    for spellings in REQUIRED_COLUMNS {
        if !spellings.iter().any(|name| headers.iter().any(|h| h == *name)) {
            return Err(PipelineError::MissingColumn(spellings[0].to_string()));
        }
    }
    Ok(())
}

fn row_error(line: u64, headers: &csv::StringRecord, err: csv::Error) -> PipelineError {
    let column = |index: u64| headers.get(index as usize).unwrap_or("?").to_string();
    let detail = match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => Some((
            de.field().map_or_else(|| "?".to_string(), column),
            de.kind().to_string(),
        )),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => Some((
            column((*len).min(expected_len.saturating_sub(1))),
            format!("row has {len} fields, header has {expected_len}"),
        )),
        csv::ErrorKind::Utf8 { err: utf8, .. } => {
            Some((column(utf8.field() as u64), utf8.to_string()))
        }
        _ => None,
    };
    match detail {
        Some((column, message)) => PipelineError::data_format(line, column, message),
        None => PipelineError::Csv(err),
    }
}

/// Parses a headered sales CSV. Any malformed row fails the whole load.
pub fn load<R: Read>(source: R) -> Result<RecordSet> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    check_columns(&headers)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let raw = result.map_err(|err| {
            let line = err.position().map_or(0, |pos| pos.line());
            row_error(line, &headers, err)
        })?;
        let line = raw.position().map_or(0, |pos| pos.line());
        let row: SalesRow = raw
            .deserialize(Some(&headers))
            .map_err(|err| row_error(line, &headers, err))?;
        records.push(row.into_record(line)?);
    }

    debug!(rows = records.len(), "parsed sales rows");
    Ok(RecordSet::new(records))
}

pub fn load_path(path: &Path) -> Result<RecordSet> {
    let file = File::open(path)?;
    let records = load(file)?;
    info!(path = %path.display(), rows = records.len(), "loaded sales dataset");
    Ok(records)
}

/// Writes records back out in the input column schema, without derived fields.
pub fn serialize(records: &[TransactionRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(SalesRow::from(record))?;
    }
    writer
        .into_inner()
        .map_err(|err| PipelineError::Io(err.into_error()))
}

pub fn write_path(path: &Path, records: &[TransactionRecord]) -> Result<()> {
    let bytes = serialize(records)?;
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), rows = records.len(), "exported filtered records");
    Ok(())
}
