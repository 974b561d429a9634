//! The company search: predicate filtering over a loaded [`Table`].

use crate::{
    dataset::TableSource,
    error::DatasetUnavailable,
    sanitize::sanitize,
    table::{Column, GEOGRAPHY_COLUMNS, OUTPUT_COLUMNS, Row, Table},
};
use serde::Serialize;
use serde_json::{Map, Number, Value, json};

/// Upper bound on rows handed back to the model.
pub const MAX_RESULTS: usize = 10;

/// Search predicates. `None` places no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub company_type: Option<String>,
    pub exclude_company_type: Option<String>,
    pub min_employees: Option<f64>,
    pub max_employees: Option<f64>,
    pub min_turnover: Option<f64>,
    pub max_turnover: Option<f64>,
    pub geography: Option<String>,
    pub sni_code: Option<String>,
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    // Nulls read as the empty string, which never contains a non-empty needle.
    haystack
        .unwrap_or_default()
        .to_lowercase()
        .contains(&needle.to_lowercase())
}

fn at_least(value: Option<f64>, bound: Option<f64>) -> bool {
    bound.is_none_or(|bound| value.is_some_and(|v| v >= bound))
}

fn at_most(value: Option<f64>, bound: Option<f64>) -> bool {
    bound.is_none_or(|bound| value.is_some_and(|v| v <= bound))
}

impl FilterCriteria {
    pub fn matches(&self, row: &Row<'_>) -> bool {
        let entity_type = row.text(Column::EntityType);
        let employees = row.number(Column::Employees);
        let turnover = row.number(Column::Turnover);

        self.company_type
            .as_deref()
            .is_none_or(|wanted| contains_ignore_case(entity_type, wanted))
            && self
                .exclude_company_type
                .as_deref()
                .is_none_or(|unwanted| !contains_ignore_case(entity_type, unwanted))
            && at_least(employees, self.min_employees)
            && at_most(employees, self.max_employees)
            && at_least(turnover, self.min_turnover)
            && at_most(turnover, self.max_turnover)
            && self.sni_code.as_deref().is_none_or(|code| {
                row.text(Column::Sni)
                    .is_some_and(|sni| sni.contains(code))
            })
            && self.geography.as_deref().is_none_or(|place| {
                GEOGRAPHY_COLUMNS
                    .iter()
                    .any(|column| contains_ignore_case(row.text(*column), place))
            })
    }
}

/// One matching company, projected to the output columns present in the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompanyRecord(Map<String, Value>);

impl CompanyRecord {
    fn project(table: &Table, row: &Row<'_>) -> Self {
        let fields = OUTPUT_COLUMNS
            .iter()
            .filter(|column| table.has_column(**column))
            .map(|column| (column.header().to_string(), cell_value(row, *column)))
            .collect();
        Self(fields)
    }

    pub fn get(&self, column: Column) -> Option<&Value> {
        self.0.get(column.header())
    }

    pub fn text(&self, column: Column) -> Option<&str> {
        self.get(column)?.as_str()
    }

    pub fn number(&self, column: Column) -> Option<f64> {
        self.get(column)?.as_f64()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn cell_value(row: &Row<'_>, column: Column) -> Value {
    let Some(text) = row.text(column) else {
        return Value::Null;
    };
    if !column.is_numeric() {
        return Value::String(text.to_string());
    }
    match row.number(column) {
        Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(n as i64),
        Some(n) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        None => Value::String(text.to_string()),
    }
}

/// Matching rows in table order, at most [`MAX_RESULTS`] of them.
pub fn filter(table: &Table, criteria: &FilterCriteria) -> Vec<CompanyRecord> {
    table
        .rows()
        .filter(|row| criteria.matches(row))
        .take(MAX_RESULTS)
        .map(|row| CompanyRecord::project(table, &row))
        .collect()
}

/// Result of one search invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<CompanyRecord>),
    Unavailable(DatasetUnavailable),
}

impl SearchOutcome {
    /// Load the table and filter it.
    pub fn run(source: &dyn TableSource, criteria: &FilterCriteria) -> Self {
        match source.load() {
            Ok(table) => {
                let rows = filter(&table, criteria);
                tracing::info!(
                    scanned = table.len(),
                    matched = rows.len(),
                    ?criteria,
                    "company search"
                );
                SearchOutcome::Found(rows)
            }
            Err(reason) => {
                tracing::warn!(error = %reason, "company search without dataset");
                SearchOutcome::Unavailable(reason)
            }
        }
    }

    /// Sanitize raw tool arguments, then run.
    pub fn from_arguments(source: &dyn TableSource, raw: &Map<String, Value>) -> Self {
        Self::run(source, &sanitize(raw))
    }

    /// JSON payload handed back to the model: an array of records, or a
    /// single `{"error": ...}` object when the dataset could not be loaded.
    pub fn to_wire(&self) -> String {
        match self {
            SearchOutcome::Found(rows) => Value::Array(
                rows.iter()
                    .map(|record| Value::Object(record.0.clone()))
                    .collect(),
            )
            .to_string(),
            SearchOutcome::Unavailable(reason) => json!([{ "error": reason.to_string() }]).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CsvDataset, DatasetConfig};
    use std::path::PathBuf;

    const HEADERS: [&str; 11] = [
        "Organization number",
        "Company name",
        "2024- Employees",
        "2024- Turnover",
        "Profit",
        "Entity type",
        "Company visiting address",
        "Company visiting postal area",
        "Company visiting county",
        "Munipality of seat",
        "SNI",
    ];

    fn row(
        org: &str,
        employees: Option<&str>,
        turnover: Option<&str>,
        entity: &str,
        postal: Option<&str>,
        county: Option<&str>,
        municipality: Option<&str>,
        sni: &str,
    ) -> Vec<Option<String>> {
        vec![
            Some(org.to_string()),
            Some(format!("Company {}", org)),
            employees.map(String::from),
            turnover.map(String::from),
            Some("1000".to_string()),
            Some(entity.to_string()),
            Some("Gatan 1".to_string()),
            postal.map(String::from),
            county.map(String::from),
            municipality.map(String::from),
            Some(sni.to_string()),
        ]
    }

    fn fixture() -> Table {
        Table::new(
            HEADERS.iter().map(|h| h.to_string()).collect(),
            vec![
                row("1", Some("150"), Some("900000"), "Aktiebolag", Some("STOCKHOLM"), Some("Stockholms län"), Some("Stockholm"), "62010"),
                row("2", Some("12"), Some("40000"), "Handelsbolag", Some("UPPSALA"), Some("Uppsala län"), Some("Uppsala"), "69201"),
                row("3", Some("100"), Some("500000"), "Aktiebolag", None, None, Some("Stockholm"), "41200"),
                row("4", None, Some("10"), "Aktiebolag", Some("MALMÖ"), Some("Skåne län"), Some("Malmö"), "62020"),
                row("5", Some("99"), None, "Enskild näringsidkare", Some("LUND"), Some("Skåne län"), Some("Lund"), "70220"),
                row("6", Some("300"), Some("2000000"), "Publikt aktiebolag", Some("KISTA"), None, Some("Stockholm"), "63110"),
                row("7", Some("5"), Some("500"), "Ekonomisk förening", None, Some("Gotlands län"), None, "03110"),
            ],
        )
    }

    fn orgs(rows: &[CompanyRecord]) -> Vec<&str> {
        rows.iter()
            .map(|r| r.text(Column::OrganizationNumber).unwrap_or_default())
            .collect()
    }

    fn many_rows(count: usize) -> Table {
        Table::new(
            HEADERS.iter().map(|h| h.to_string()).collect(),
            (0..count)
                .map(|i| {
                    row(&i.to_string(), Some(&i.to_string()), Some("1"), "Aktiebolag", Some("X"), Some("Y"), Some("Z"), "1")
                })
                .collect(),
        )
    }

    #[test]
    fn test_no_criteria_returns_first_rows_in_order() {
        let table = many_rows(25);
        let rows = filter(&table, &FilterCriteria::default());
        assert_eq!(rows.len(), MAX_RESULTS);
        assert_eq!(orgs(&rows), ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);

        let small = fixture();
        assert_eq!(filter(&small, &FilterCriteria::default()).len(), small.len());
    }

    #[test]
    fn test_result_is_capped() {
        let table = many_rows(40);
        let criteria = FilterCriteria {
            min_employees: Some(5.0),
            ..Default::default()
        };
        let rows = filter(&table, &criteria);
        assert_eq!(rows.len(), MAX_RESULTS);
        assert_eq!(rows[0].text(Column::OrganizationNumber), Some("5"));
    }

    #[test]
    fn test_company_type_is_case_insensitive_substring() {
        let criteria = FilterCriteria {
            company_type: Some("AKTIEBOLAG".into()),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["1", "3", "4", "6"]);
    }

    #[test]
    fn test_exclusion_is_applied_independently() {
        let criteria = FilterCriteria {
            company_type: Some("Aktiebolag".into()),
            exclude_company_type: Some("Aktiebolag".into()),
            ..Default::default()
        };
        assert!(filter(&fixture(), &criteria).is_empty());

        let criteria = FilterCriteria {
            company_type: Some("aktiebolag".into()),
            exclude_company_type: Some("publikt".into()),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["1", "3", "4"]);
    }

    #[test]
    fn test_numeric_bounds_are_inclusive() {
        let criteria = FilterCriteria {
            min_employees: Some(99.0),
            max_employees: Some(150.0),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["1", "3", "5"]);

        let criteria = FilterCriteria {
            min_turnover: Some(500.0),
            max_turnover: Some(500000.0),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["2", "3", "7"]);
    }

    #[test]
    fn test_null_numbers_never_satisfy_a_bound() {
        let criteria = FilterCriteria {
            max_employees: Some(1_000_000.0),
            ..Default::default()
        };
        assert!(!orgs(&filter(&fixture(), &criteria)).contains(&"4"));
    }

    #[test]
    fn test_inverted_bounds_yield_empty_result() {
        let criteria = FilterCriteria {
            min_employees: Some(50.0),
            max_employees: Some(10.0),
            ..Default::default()
        };
        assert!(filter(&fixture(), &criteria).is_empty());
    }

    #[test]
    fn test_geography_matches_any_location_column() {
        let criteria = FilterCriteria {
            geography: Some("stockholm".into()),
            ..Default::default()
        };
        // Row 3 only has a municipality; row 6 has no county.
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["1", "3", "6"]);

        let criteria = FilterCriteria {
            geography: Some("skåne".into()),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["4", "5"]);

        let criteria = FilterCriteria {
            geography: Some("GOTLAND".into()),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["7"]);
    }

    #[test]
    fn test_sni_code_substring() {
        let criteria = FilterCriteria {
            sni_code: Some("620".into()),
            ..Default::default()
        };
        assert_eq!(orgs(&filter(&fixture(), &criteria)), ["1", "4"]);
    }

    #[test]
    fn test_every_result_satisfies_criteria_and_none_are_missed() {
        let table = fixture();
        let cases = [
            FilterCriteria {
                company_type: Some("bolag".into()),
                min_employees: Some(10.0),
                ..Default::default()
            },
            FilterCriteria {
                geography: Some("län".into()),
                max_turnover: Some(1_000_000.0),
                ..Default::default()
            },
            FilterCriteria {
                exclude_company_type: Some("aktiebolag".into()),
                sni_code: Some("0".into()),
                ..Default::default()
            },
        ];

        for criteria in cases {
            let rows = filter(&table, &criteria);
            let expected: Vec<String> = table
                .rows()
                .filter(|row| criteria.matches(row))
                .filter_map(|row| row.text(Column::OrganizationNumber).map(String::from))
                .collect();
            assert!(expected.len() < MAX_RESULTS);
            assert_eq!(orgs(&rows), expected, "criteria: {:?}", criteria);
        }
    }

    #[test]
    fn test_projection_omits_absent_columns_and_types_numbers() {
        let table = Table::new(
            vec![
                "Company name".into(),
                "2024- Employees".into(),
                "Profit".into(),
                "Entity type".into(),
                "Unrelated".into(),
            ],
            vec![vec![
                Some("Acme AB".into()),
                Some("42".into()),
                Some("-1250.5".into()),
                Some("Aktiebolag".into()),
                Some("x".into()),
            ]],
        );

        let rows = filter(&table, &FilterCriteria::default());
        let record = &rows[0];
        assert_eq!(
            record.columns().collect::<Vec<_>>(),
            ["Company name", "2024- Employees", "Profit", "Entity type"]
        );
        assert_eq!(record.get(Column::Employees), Some(&json!(42)));
        assert_eq!(record.number(Column::Profit), Some(-1250.5));
    }

    #[test]
    fn test_wire_format() {
        let empty = SearchOutcome::Found(Vec::new());
        assert_eq!(empty.to_wire(), "[]");

        let unavailable =
            SearchOutcome::Unavailable(DatasetUnavailable::NotFound(PathBuf::from("sample_rows.csv")));
        let value: Value = serde_json::from_str(&unavailable.to_wire()).unwrap();
        assert_eq!(
            value,
            json!([{ "error": "Data file 'sample_rows.csv' not found." }])
        );
        let only = value[0].as_object().unwrap();
        assert_eq!(only.keys().collect::<Vec<_>>(), ["error"]);
    }

    #[test]
    fn test_run_against_missing_dataset() {
        let dataset = CsvDataset::new(DatasetConfig {
            path: PathBuf::from("/nowhere/sample_rows.csv"),
        });
        let outcome = SearchOutcome::run(&dataset, &FilterCriteria::default());
        assert!(matches!(outcome, SearchOutcome::Unavailable(DatasetUnavailable::NotFound(_))));
    }

    #[test]
    fn test_limited_companies_in_stockholm_with_many_employees() -> anyhow::Result<()> {
        let dataset = CsvDataset::new(DatasetConfig {
            path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sample_rows.csv"),
        });
        let raw = serde_json::from_value::<Map<String, Value>>(json!({
            "company_type": "Aktiebolag",
            "geography": "Stockholm",
            "min_employees": 100,
        }))?;

        let SearchOutcome::Found(rows) = SearchOutcome::from_arguments(&dataset, &raw) else {
            anyhow::bail!("bundled dataset should load");
        };

        assert!(!rows.is_empty());
        assert!(rows.len() <= MAX_RESULTS);
        for record in &rows {
            assert!(
                record
                    .text(Column::EntityType)
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains("aktiebolag")
            );
            assert!(record.number(Column::Employees).unwrap_or_default() >= 100.0);
        }
        Ok(())
    }
}
