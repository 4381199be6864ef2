use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregate::{aggregate, AggregateSpec};
use crate::dashboard::{Dashboard, Session};
use crate::filter::{Attribute, CriteriaSelection};

mod aggregate;
mod dashboard;
mod error;
mod filter;
mod loader;
mod models;
mod report;
#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "sales-dashboard")]
#[command(about = "Filter and summarize supermarket sales data", long_about = None)]
struct Cli {
    /// Sales CSV to load
    #[arg(long, env = "SALES_DATA_PATH", default_value = "supermarket_sales.csv", global = true)]
    data: PathBuf,
    /// JSON file with allowed values per attribute; omitted attributes allow everything
    #[arg(long, env = "SALES_CRITERIA_PATH", global = true)]
    criteria: Option<PathBuf>,
    #[arg(long = "branch", global = true)]
    branches: Vec<String>,
    #[arg(long = "city", global = true)]
    cities: Vec<String>,
    #[arg(long = "gender", global = true)]
    genders: Vec<String>,
    #[arg(long = "customer-type", global = true)]
    customer_types: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the KPI tiles
    Summary,
    /// Print the chart tables
    Views {
        #[arg(long)]
        view: Option<String>,
    },
    /// Run an ad-hoc grouped aggregate over the filtered set
    Aggregate {
        #[arg(long = "group-by", required = true)]
        group_by: Vec<String>,
        #[arg(long)]
        sum: Vec<String>,
        #[arg(long)]
        mean: Vec<String>,
        #[arg(long)]
        count: bool,
        #[arg(long)]
        share: bool,
        /// Order rows by this value column, largest first
        #[arg(long)]
        top: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write a markdown report
    Report {
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Print the KPIs and every view as JSON
    Snapshot,
    /// List the values each filter attribute can take
    Options,
    /// Export the filtered records as CSV
    Export {
        #[arg(long, default_value = "filtered_supermarket_sales.csv")]
        out: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_selection(path: &Path) -> anyhow::Result<CriteriaSelection> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read criteria file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("criteria file {} is not valid JSON criteria", path.display()))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let records = loader::load_path(&cli.data)
        .with_context(|| format!("failed to load sales data from {}", cli.data.display()))?;
    if records.is_empty() {
        warn!(path = %cli.data.display(), "sales dataset has no rows");
    }

    let mut selection = match &cli.criteria {
        Some(path) => read_selection(path)?,
        None => CriteriaSelection::default(),
    };
    selection.restrict(Attribute::Branch, &cli.branches);
    selection.restrict(Attribute::City, &cli.cities);
    selection.restrict(Attribute::Gender, &cli.genders);
    selection.restrict(Attribute::CustomerType, &cli.customer_types);

    let dashboard = Dashboard::standard().context("standard dashboard views are misconfigured")?;
    let mut session = Session::new(records, dashboard);
    let criteria = selection.resolve(session.records());
    session.apply(criteria);
    let snapshot = session.current();

    match cli.command {
        Commands::Summary => {
            let kpis = &snapshot.kpis;
            if kpis.transactions == 0 {
                println!("No transactions match the current filters.");
                return Ok(());
            }

            println!("Key performance indicators ({} transactions):", kpis.transactions);
            println!("- Total Revenue: {}", report::format_currency(kpis.total_revenue));
            println!("- Total Quantity: {}", kpis.total_quantity);
            if let Some(rating) = kpis.average_rating {
                println!("- Avg. Rating: {rating:.2}");
            }
            println!("- Gross Income: {}", report::format_currency(kpis.gross_income));
        }
        Commands::Views { view } => {
            let tables: Vec<_> = match view.as_deref() {
                Some(name) => match snapshot.view(name) {
                    Some(table) => vec![table],
                    None => {
                        let known: Vec<&str> =
                            session.dashboard().views().iter().map(|spec| spec.name()).collect();
                        bail!("no view named `{name}`; available: {}", known.join(", "))
                    }
                },
                None => snapshot.views.iter().collect(),
            };

            let mut output = String::new();
            for table in tables {
                output.push_str(&format!("## {}\n", table.name));
                report::write_table(&mut output, table);
                output.push('\n');
            }
            print!("{output}");
        }
        Commands::Aggregate {
            group_by,
            sum,
            mean,
            count,
            share,
            top,
            limit,
        } => {
            let keys: Vec<&str> = group_by.iter().map(String::as_str).collect();
            let mut spec = AggregateSpec::new("aggregate", &keys)?;
            for measure in &sum {
                spec = spec.sum(measure)?;
            }
            for measure in &mean {
                spec = spec.mean(measure)?;
            }
            if count || (sum.is_empty() && mean.is_empty() && !share) {
                spec = spec.count();
            }
            if share {
                spec = spec.share();
            }
            if let Some(column) = top.as_deref() {
                spec = spec.descending_by(column)?;
            }

            let mut table = aggregate(&snapshot.filtered, &spec);
            if let Some(limit) = limit {
                table.rows.truncate(limit);
            }
            let mut output = String::new();
            report::write_table(&mut output, &table);
            print!("{output}");
        }
        Commands::Report { out } => {
            let report = report::build_report(&cli.data.display().to_string(), snapshot);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
        Commands::Snapshot => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        }
        Commands::Options => {
            for attribute in Attribute::ALL {
                let values = filter::options(session.records(), attribute);
                println!("{}: {}", attribute.column(), values.join(", "));
            }
        }
        Commands::Export { out } => {
            loader::write_path(&out, &snapshot.filtered)
                .with_context(|| format!("failed to export to {}", out.display()))?;
            println!(
                "Exported {} records to {}.",
                snapshot.filtered.len(),
                out.display()
            );
        }
    }

    Ok(())
}
