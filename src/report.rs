use std::collections::BTreeSet;
use std::fmt::Write;

use crate::aggregate::AggregateTable;
use crate::dashboard::DashboardSnapshot;
use crate::filter::Attribute;

const NO_DATA: &str = "No data";

/// `$1,234.56` style amount.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::new();
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => NO_DATA.to_string(),
    }
}

fn format_selection(values: &BTreeSet<String>) -> String {
    if values.is_empty() {
        "(none selected)".to_string()
    } else {
        values.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

pub fn write_table(output: &mut String, table: &AggregateTable) {
    if table.is_empty() {
        let _ = writeln!(output, "{NO_DATA}.");
        return;
    }

    let mut header: Vec<&str> = table.key_columns.iter().map(String::as_str).collect();
    header.extend(table.value_columns.iter().map(String::as_str));
    let _ = writeln!(output, "| {} |", header.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(header.len()));

    for row in &table.rows {
        let cells: Vec<String> = row
            .key
            .iter()
            .map(ToString::to_string)
            .chain(row.values.iter().map(|value| format_value(*value)))
            .collect();
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }
}

pub fn build_report(source: &str, snapshot: &DashboardSnapshot) -> String {
    let mut output = String::new();
    let kpis = &snapshot.kpis;

    let _ = writeln!(output, "# Supermarket Sales Dashboard");
    let _ = writeln!(
        output,
        "Generated from {} ({} transactions after filtering)",
        source, kpis.transactions
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Filters");
    for attribute in Attribute::ALL {
        let _ = writeln!(
            output,
            "- {}: {}",
            attribute.column(),
            format_selection(snapshot.criteria.allowed(attribute))
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Performance Indicators");
    let _ = writeln!(output, "- Total Revenue: {}", format_currency(kpis.total_revenue));
    let _ = writeln!(output, "- Total Quantity: {}", kpis.total_quantity);
    let _ = writeln!(
        output,
        "- Avg. Rating: {}",
        kpis.average_rating
            .map_or_else(|| NO_DATA.to_string(), |rating| format!("{rating:.2}"))
    );
    let _ = writeln!(output, "- Gross Income: {}", format_currency(kpis.gross_income));

    for table in &snapshot.views {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", table.name);
        write_table(&mut output, table);
    }

    output
}
