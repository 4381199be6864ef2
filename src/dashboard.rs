use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{aggregate, AggregateSpec, AggregateTable};
use crate::error::Result;
use crate::filter::{filter, FilterCriteria};
use crate::models::{Kpis, RecordSet};

/// The chart views of the sales dashboard, evaluated together.
#[derive(Debug, Clone)]
pub struct Dashboard {
    views: Vec<AggregateSpec>,
}

impl Dashboard {
    pub fn new(views: Vec<AggregateSpec>) -> Self {
        Self { views }
    }

    pub fn standard() -> Result<Self> {
        let mut views = vec![
            AggregateSpec::new("monthly_trend", &["Month"])?
                .sum("Total")?
                .sum("Quantity")?,
            AggregateSpec::new("product_lines", &["Product line"])?
                .sum("Quantity")?
                .sum("Total")?
                .descending_by("Total")?,
        ];
        for (name, key) in [
            ("branches", "Branch"),
            ("cities", "City"),
            ("genders", "Gender"),
            ("customer_types", "Customer type"),
        ] {
            views.push(AggregateSpec::new(name, &[key])?.sum("Quantity")?.sum("Total")?);
        }
        views.push(AggregateSpec::new("payment_share", &["Payment"])?.share());
        Ok(Self::new(views))
    }

    pub fn views(&self) -> &[AggregateSpec] {
        &self.views
    }

    /// Runs filter, KPIs and every view against one criteria value.
    pub fn evaluate(&self, records: &RecordSet, criteria: &FilterCriteria) -> DashboardSnapshot {
        let filtered = filter(records, criteria);
        let kpis = Kpis::compute(filtered.as_slice());
        let views = self
            .views
            .iter()
            .map(|spec| aggregate(&filtered, spec))
            .collect();
        debug!(
            rows = filtered.len(),
            views = self.views.len(),
            "evaluated dashboard"
        );
        DashboardSnapshot {
            generation: 0,
            criteria: criteria.clone(),
            kpis,
            views,
            filtered,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generation: u64,
    pub criteria: FilterCriteria,
    pub kpis: Kpis,
    pub views: Vec<AggregateTable>,
    #[serde(skip)]
    pub filtered: RecordSet,
}

impl DashboardSnapshot {
    pub fn view(&self, name: &str) -> Option<&AggregateTable> {
        self.views.iter().find(|table| table.name == name)
    }
}

/// A numbered criteria change awaiting evaluation.
#[derive(Debug, Clone)]
pub struct Request {
    generation: u64,
    criteria: FilterCriteria,
}

impl Request {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn evaluate(&self, records: &RecordSet, dashboard: &Dashboard) -> DashboardSnapshot {
        DashboardSnapshot {
            generation: self.generation,
            ..dashboard.evaluate(records, &self.criteria)
        }
    }
}

/// One viewer's state: the shared dataset, its dashboard, and the latest
/// published snapshot. Results of superseded requests are dropped.
#[derive(Debug)]
pub struct Session {
    records: RecordSet,
    dashboard: Dashboard,
    latest_request: u64,
    current: DashboardSnapshot,
}

impl Session {
    pub fn new(records: RecordSet, dashboard: Dashboard) -> Self {
        let criteria = FilterCriteria::allow_all(&records);
        let current = dashboard.evaluate(&records, &criteria);
        Self {
            records,
            dashboard,
            latest_request: 0,
            current,
        }
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn current(&self) -> &DashboardSnapshot {
        &self.current
    }

    pub fn request(&mut self, criteria: FilterCriteria) -> Request {
        self.latest_request += 1;
        Request {
            generation: self.latest_request,
            criteria,
        }
    }

    /// Accepts `snapshot` only if it answers the most recent request.
    pub fn publish(&mut self, snapshot: DashboardSnapshot) -> bool {
        if snapshot.generation != self.latest_request {
            debug!(
                stale = snapshot.generation,
                latest = self.latest_request,
                "discarding superseded snapshot"
            );
            return false;
        }
        self.current = snapshot;
        true
    }

    pub fn apply(&mut self, criteria: FilterCriteria) -> &DashboardSnapshot {
        let request = self.request(criteria);
        debug!(generation = request.generation(), "evaluating criteria change");
        let snapshot = request.evaluate(&self.records, &self.dashboard);
        self.publish(snapshot);
        info!(
            generation = self.current.generation,
            rows = self.current.filtered.len(),
            "criteria applied"
        );
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::filter::Attribute;
    use crate::loader::load;
    use crate::testing::{row, SAMPLE_CSV};

    fn session() -> Session {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        Session::new(records, Dashboard::standard().unwrap())
    }

    #[test]
    fn standard_dashboard_has_every_chart() {
        let dashboard = Dashboard::standard().unwrap();
        let names: Vec<&str> = dashboard.views().iter().map(|spec| spec.name()).collect();
        assert_eq!(
            names,
            vec![
                "monthly_trend",
                "product_lines",
                "branches",
                "cities",
                "genders",
                "customer_types",
                "payment_share",
            ]
        );
    }

    #[test]
    fn initial_snapshot_covers_the_whole_dataset() {
        let session = session();
        let snapshot = session.current();
        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.kpis.transactions, 5);
        assert_eq!(snapshot.kpis.total_quantity, 34);

        let months = snapshot.view("monthly_trend").unwrap();
        assert_eq!(months.rows.len(), 3);
        let january = &months.rows[0];
        assert_relative_eq!(january.values[0].unwrap(), 548.9715 + 489.048, epsilon = 1e-9);
        assert_eq!(january.values[1], Some(15.0));

        let products = snapshot.view("product_lines").unwrap();
        assert_eq!(products.rows[0].key[0].to_string(), "Health and beauty");
    }

    #[test]
    fn every_view_derives_from_the_filtered_set() {
        let mut session = session();
        let mut criteria = session.current().criteria.clone();
        criteria.set(Attribute::Branch, ["A"]);

        let snapshot = session.apply(criteria);
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.kpis.transactions, 3);
        for table in &snapshot.views {
            assert!(row(table, "B").is_none());
            assert!(row(table, "Mandalay").is_none());
        }
        let branches = snapshot.view("branches").unwrap();
        assert_eq!(branches.rows.len(), 1);
    }

    #[test]
    fn empty_criteria_render_as_empty_views() {
        let mut session = session();
        let mut criteria = session.current().criteria.clone();
        criteria.set(Attribute::Gender, Vec::<String>::new());

        let snapshot = session.apply(criteria);
        assert_eq!(snapshot.kpis.transactions, 0);
        assert_eq!(snapshot.kpis.average_rating, None);
        assert!(snapshot.views.iter().all(AggregateTable::is_empty));
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut session = session();
        let all = session.current().criteria.clone();
        let mut only_c = all.clone();
        only_c.set(Attribute::Branch, ["C"]);

        let older = session.request(all);
        let newer = session.request(only_c);
        let newer_snapshot = newer.evaluate(session.records(), session.dashboard());
        let older_snapshot = older.evaluate(session.records(), session.dashboard());

        assert!(session.publish(newer_snapshot));
        assert!(!session.publish(older_snapshot));
        assert_eq!(session.current().generation, newer.generation());
        assert_eq!(session.current().kpis.transactions, 1);
    }
}
