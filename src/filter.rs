use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{RecordSet, TransactionRecord};

/// Categorical columns the dashboard can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Branch,
    City,
    Gender,
    CustomerType,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Branch,
        Attribute::City,
        Attribute::Gender,
        Attribute::CustomerType,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Attribute::Branch => "Branch",
            Attribute::City => "City",
            Attribute::Gender => "Gender",
            Attribute::CustomerType => "Customer type",
        }
    }

    pub fn value<'a>(&self, record: &'a TransactionRecord) -> &'a str {
        match self {
            Attribute::Branch => &record.branch,
            Attribute::City => &record.city,
            Attribute::Gender => &record.gender,
            Attribute::CustomerType => &record.customer_type,
        }
    }
}

/// Allowed values per attribute. An empty set admits no record at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub branches: BTreeSet<String>,
    pub cities: BTreeSet<String>,
    pub genders: BTreeSet<String>,
    pub customer_types: BTreeSet<String>,
}

impl FilterCriteria {
    /// Every value present in `records`, the selection a fresh session starts with.
    pub fn allow_all(records: &[TransactionRecord]) -> Self {
        let mut criteria = Self::default();
        for attribute in Attribute::ALL {
            criteria.set(attribute, options(records, attribute));
        }
        criteria
    }

    pub fn allowed(&self, attribute: Attribute) -> &BTreeSet<String> {
        match attribute {
            Attribute::Branch => &self.branches,
            Attribute::City => &self.cities,
            Attribute::Gender => &self.genders,
            Attribute::CustomerType => &self.customer_types,
        }
    }

    pub fn set<I, S>(&mut self, attribute: Attribute, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        match attribute {
            Attribute::Branch => self.branches = values,
            Attribute::City => self.cities = values,
            Attribute::Gender => self.genders = values,
            Attribute::CustomerType => self.customer_types = values,
        }
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        Attribute::ALL
            .iter()
            .all(|attribute| self.allowed(*attribute).contains(attribute.value(record)))
    }
}

/// Partial criteria as given by flags or a criteria file. `None` means every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriteriaSelection {
    #[serde(default)]
    pub branches: Option<BTreeSet<String>>,
    #[serde(default)]
    pub cities: Option<BTreeSet<String>>,
    #[serde(default)]
    pub genders: Option<BTreeSet<String>>,
    #[serde(default)]
    pub customer_types: Option<BTreeSet<String>>,
}

impl CriteriaSelection {
    fn slot(&mut self, attribute: Attribute) -> &mut Option<BTreeSet<String>> {
        match attribute {
            Attribute::Branch => &mut self.branches,
            Attribute::City => &mut self.cities,
            Attribute::Gender => &mut self.genders,
            Attribute::CustomerType => &mut self.customer_types,
        }
    }

    /// Restricts `attribute` to `values`. An empty list leaves the attribute unconstrained.
    pub fn restrict(&mut self, attribute: Attribute, values: &[String]) {
        if !values.is_empty() {
            *self.slot(attribute) = Some(values.iter().cloned().collect());
        }
    }

    pub fn resolve(mut self, records: &[TransactionRecord]) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        for attribute in Attribute::ALL {
            match self.slot(attribute).take() {
                Some(values) => criteria.set(attribute, values),
                None => criteria.set(attribute, options(records, attribute)),
            }
        }
        criteria
    }
}

/// Distinct values of `attribute` in first-appearance order.
pub fn options(records: &[TransactionRecord], attribute: Attribute) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|record| attribute.value(record))
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

/// Records passing every attribute's allowed set, in their original order.
pub fn filter(records: &RecordSet, criteria: &FilterCriteria) -> RecordSet {
    let kept: Vec<TransactionRecord> = records
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect();
    debug!(loaded = records.len(), kept = kept.len(), "applied filter criteria");
    RecordSet::new(kept)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::loader::load;
    use crate::testing::{record, SAMPLE_CSV};

    fn three_records() -> RecordSet {
        RecordSet::new(vec![
            record("A", "Female", 10.0),
            record("A", "Male", 20.0),
            record("B", "Female", 5.0),
        ])
    }

    #[test]
    fn keeps_matching_records_in_order() {
        let records = three_records();
        let mut criteria = FilterCriteria::allow_all(&records);
        criteria.set(Attribute::Branch, ["A"]);
        criteria.set(Attribute::Gender, ["Female", "Male"]);

        let filtered = filter(&records, &criteria);
        assert_eq!(filtered.as_slice(), &records[..2]);
    }

    #[rstest]
    #[case(Attribute::Branch)]
    #[case(Attribute::City)]
    #[case(Attribute::Gender)]
    #[case(Attribute::CustomerType)]
    fn empty_allowed_set_excludes_everything(#[case] attribute: Attribute) {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        let mut criteria = FilterCriteria::allow_all(&records);
        criteria.set(attribute, Vec::<String>::new());

        assert!(filter(&records, &criteria).is_empty());
    }

    #[test]
    fn result_is_subset_satisfying_every_attribute() {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        let mut criteria = FilterCriteria::allow_all(&records);
        criteria.set(Attribute::Gender, ["Male"]);
        criteria.set(Attribute::City, ["Yangon", "Mandalay"]);

        let filtered = filter(&records, &criteria);
        assert_eq!(filtered.len(), 3);
        for kept in &filtered {
            assert!(records.contains(kept));
            for attribute in Attribute::ALL {
                assert!(criteria.allowed(attribute).contains(attribute.value(kept)));
            }
        }
    }

    #[test]
    fn allow_all_keeps_everything() {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        let criteria = FilterCriteria::allow_all(&records);
        assert_eq!(filter(&records, &criteria), records);
    }

    #[test]
    fn options_follow_first_appearance() {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(options(&records, Attribute::Branch), vec!["A", "C", "B"]);
        assert_eq!(
            options(&records, Attribute::CustomerType),
            vec!["Member", "Normal"]
        );
    }

    #[test]
    fn selection_defaults_missing_attributes_to_every_value() {
        let records = load(SAMPLE_CSV.as_bytes()).unwrap();
        let selection: CriteriaSelection =
            serde_json::from_str(r#"{"branches": ["B"], "genders": []}"#).unwrap();
        let criteria = selection.resolve(&records);

        assert_eq!(criteria.branches, BTreeSet::from(["B".to_string()]));
        assert!(criteria.genders.is_empty());
        assert_eq!(criteria.cities.len(), 3);
        assert!(filter(&records, &criteria).is_empty());
    }

    #[test]
    fn misspelled_criteria_keys_are_rejected() {
        let parsed = serde_json::from_str::<CriteriaSelection>(r#"{"gender": []}"#);
        let err = parsed.unwrap_err().to_string();
        assert!(err.contains("unknown field `gender`"), "{err}");
    }

    #[test]
    fn restrict_ignores_empty_flag_lists() {
        let mut selection = CriteriaSelection::default();
        selection.restrict(Attribute::City, &[]);
        selection.restrict(Attribute::Branch, &["C".to_string()]);
        assert_eq!(selection.cities, None);
        assert_eq!(selection.branches, Some(BTreeSet::from(["C".to_string()])));
    }
}
