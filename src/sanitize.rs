//! Turns loosely-typed tool arguments from the model into [`FilterCriteria`].
//!
//! Models send quoted numbers, empty strings and renamed fields. Conversion is
//! total: anything that cannot be read as the expected kind of value is treated
//! as "not specified".

use crate::filter::FilterCriteria;
use serde_json::{Map, Value};

/// One argument value after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    NotSpecified,
    Number(f64),
    Text(String),
}

impl Arg {
    pub fn classify(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map_or(Arg::NotSpecified, Arg::Number),
            Some(Value::String(s)) if !s.trim().is_empty() => Arg::Text(s.trim().to_string()),
            // Null, blank strings, booleans, arrays and objects.
            _ => Arg::NotSpecified,
        }
    }

    /// Numeric bounds accept genuine numbers only; `"5"` is not 5.
    fn into_number(self) -> Option<f64> {
        match self {
            Arg::Number(n) if n.is_finite() => Some(n),
            _ => None,
        }
    }

    /// Text filters also take bare numbers, e.g. an SNI code sent as `62010`.
    fn into_text(self) -> Option<String> {
        match self {
            Arg::Text(s) => Some(s),
            Arg::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", n as i64)),
            Arg::Number(n) => Some(n.to_string()),
            Arg::NotSpecified => None,
        }
    }
}

/// Canonical argument names followed by the alternate spellings models use.
const ALIASES: &[(&str, &[&str])] = &[
    ("company_type", &["entity_type", "legal_form"]),
    (
        "exclude_company_type",
        &[
            "company_type_not",
            "not_company_type",
            "company_type_ne",
            "company_type_not_equal",
            "exclude_entity_type",
            "entity_type_not",
        ],
    ),
    ("min_employees", &["employees_min", "min_employee_count"]),
    ("max_employees", &["employees_max", "max_employee_count"]),
    ("min_turnover", &["turnover_min", "min_revenue"]),
    ("max_turnover", &["turnover_max", "max_revenue"]),
    ("geography", &["location", "city", "county", "municipality", "region"]),
    ("sni_code", &["sni", "industry_code"]),
];

/// First specified value among the canonical name and its aliases, in that order.
fn lookup(raw: &Map<String, Value>, canonical: &str) -> Arg {
    let aliases = ALIASES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map_or(&[][..], |(_, aliases)| *aliases);

    std::iter::once(canonical)
        .chain(aliases.iter().copied())
        .map(|name| Arg::classify(raw.get(name)))
        .find(|arg| *arg != Arg::NotSpecified)
        .unwrap_or(Arg::NotSpecified)
}

fn number(raw: &Map<String, Value>, canonical: &str) -> Option<f64> {
    match lookup(raw, canonical) {
        // A quoted number under the canonical name is rejected outright rather
        // than letting an alias supply a different value.
        Arg::Text(_) => None,
        arg => arg.into_number(),
    }
}

fn text(raw: &Map<String, Value>, canonical: &str) -> Option<String> {
    lookup(raw, canonical).into_text()
}

/// Build criteria from raw tool arguments. Never fails; unknown names are dropped.
pub fn sanitize(raw: &Map<String, Value>) -> FilterCriteria {
    let known = |key: &String| {
        ALIASES
            .iter()
            .any(|(name, aliases)| *name == key.as_str() || aliases.contains(&key.as_str()))
    };
    for key in raw.keys().filter(|key| !known(key)) {
        tracing::debug!(argument = %key, "ignoring unknown search argument");
    }

    FilterCriteria {
        company_type: text(raw, "company_type"),
        exclude_company_type: text(raw, "exclude_company_type"),
        min_employees: number(raw, "min_employees"),
        max_employees: number(raw, "max_employees"),
        min_turnover: number(raw, "min_turnover"),
        max_turnover: number(raw, "max_turnover"),
        geography: text(raw, "geography"),
        sni_code: text(raw, "sni_code"),
    }
}

/// Parse the model's JSON-encoded argument string. Anything other than a JSON
/// object becomes an empty argument map.
pub fn parse_arguments(arguments: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(arguments = %other, "tool arguments are not an object");
            Map::new()
        }
        Err(e) if arguments.trim().is_empty() => {
            tracing::debug!(error = %e, "empty tool arguments");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "tool arguments are not valid JSON");
            Map::new()
        }
    }
}
