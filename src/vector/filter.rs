//! Structured payload filters
//!
//! A [`Filter`] is a conjunction of [`Condition`]s. Keys name payload fields;
//! `Nested` conditions hold when at least one element of a payload array
//! satisfies the inner filter.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub must: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals one of `values`; for array fields, any element does
    MatchAny { key: String, values: Vec<String> },
    /// Numeric field within inclusive bounds
    Range {
        key: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
    /// Some element of the array at `key` matches `filter`
    Nested { key: String, filter: Filter },
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluate against an encoded payload
    pub fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|c| c.matches(payload))
    }
}

impl Condition {
    pub fn match_any<I, S>(key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MatchAny {
            key: key.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(key: &str, gte: Option<f64>, lte: Option<f64>) -> Self {
        Self::Range {
            key: key.to_string(),
            gte,
            lte,
        }
    }

    pub fn nested(key: &str, filter: Filter) -> Self {
        Self::Nested {
            key: key.to_string(),
            filter,
        }
    }

    fn matches(&self, payload: &Value) -> bool {
        match self {
            Self::MatchAny { key, values } => match payload.get(key) {
                Some(Value::String(s)) => values.iter().any(|v| v == s),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|s| values.iter().any(|v| v == s)),
                Some(Value::Bool(b)) => values.iter().any(|v| v == &b.to_string()),
                Some(Value::Number(n)) => values.iter().any(|v| v == &n.to_string()),
                _ => false,
            },
            Self::Range { key, gte, lte } => match payload.get(key).and_then(Value::as_f64) {
                Some(x) => gte.map_or(true, |g| x >= g) && lte.map_or(true, |l| x <= l),
                None => false,
            },
            Self::Nested { key, filter } => match payload.get(key) {
                Some(Value::Array(items)) => items.iter().any(|item| filter.matches(item)),
                _ => false,
            },
        }
    }
}
