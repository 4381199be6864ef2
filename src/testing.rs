use chrono::{NaiveDate, NaiveTime};

use crate::aggregate::{AggregateRow, AggregateTable, KeyValue};
use crate::models::TransactionRecord;

pub const SAMPLE_CSV: &str = "\
Invoice ID,Branch,City,Customer type,Gender,Product line,Unit price,Quantity,Tax 5%,Total,Date,Time,Payment,cogs,gross margin percentage,gross income,Rating
750-67-8428,A,Yangon,Member,Female,Health and beauty,74.69,7,26.1415,548.9715,1/5/2019,13:08,Ewallet,522.83,4.761904762,26.1415,9.1
226-31-3081,C,Naypyitaw,Normal,Female,Electronic accessories,15.28,5,3.82,80.22,3/8/2019,10:29,Cash,76.4,4.761904762,3.82,9.6
631-41-3108,A,Yangon,Normal,Male,Home and lifestyle,46.33,7,16.2155,340.5255,3/3/2019,13:23,Credit card,324.31,4.761904762,16.2155,7.4
123-19-1176,A,Yangon,Member,Male,Health and beauty,58.22,8,23.288,489.048,1/27/2019,20:33,Ewallet,465.76,4.761904762,23.288,8.4
373-73-7910,B,Mandalay,Normal,Male,Sports and travel,86.31,7,30.2085,634.3785,2/8/2019,10:37,Ewallet,604.17,4.761904762,30.2085,5.3
";

pub fn record(branch: &str, gender: &str, total: f64) -> TransactionRecord {
    let date = NaiveDate::from_ymd_opt(2019, 1, 5).unwrap();
    TransactionRecord {
        invoice_id: None,
        branch: branch.to_string(),
        city: "Yangon".to_string(),
        customer_type: "Member".to_string(),
        gender: gender.to_string(),
        product_line: "Health and beauty".to_string(),
        unit_price: total,
        quantity: 1,
        tax: 0.0,
        total,
        date,
        time: NaiveTime::from_hms_opt(13, 8, 0).unwrap(),
        payment: "Cash".to_string(),
        cogs: None,
        gross_margin_percentage: None,
        gross_income: total * 0.05,
        rating: 7.0,
        month: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
        day: 5,
        hour: 13,
    }
}

/// Row of a single-key table whose key is `key`.
pub fn row<'a>(table: &'a AggregateTable, key: &str) -> Option<&'a AggregateRow> {
    table
        .rows
        .iter()
        .find(|row| matches!(row.key.as_slice(), [KeyValue::Text(text)] if text == key))
}
