//! Statement parameters and result rows

use std::collections::VecDeque;

use serde_json::Value;

/// A result row keyed by field name
pub type Row = serde_json::Map<String, Value>;

/// Values bound to a prepared statement
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    Empty,
    /// Bound in order to `?` placeholders
    Positional(Vec<Value>),
    /// Bound to `:name` placeholders; names may omit the leading colon
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Empty => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(values) => values.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Empty => 0,
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::Empty
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Params::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(values: Vec<(String, Value)>) -> Self {
        Params::Named(values)
    }
}

impl From<Vec<(&str, Value)>> for Params {
    fn from(values: Vec<(&str, Value)>) -> Self {
        Params::Named(
            values
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// Whether a column value counts as "set" for existence checks.
///
/// The value is read as an integer and compared to zero. Fractions are
/// truncated, and strings use their leading numeric part, so `"0.00"`,
/// `"0.5"` and `"no"` are all false while `"2.50"` and `"3 rows"` are true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(i) => i != 0,
            None => n.as_u64().is_some() || n.as_f64().is_some_and(|f| f.trunc() != 0.0),
        },
        Value::String(s) => leading_number(s).trunc() != 0.0,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Longest numeric prefix of `s` after leading whitespace, or zero
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(s.len());
    (1..=end)
        .rev()
        .find_map(|len| s[..len].parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .unwrap_or_default()
}

/// An executed statement with its result set buffered.
///
/// Rows are handed out in order by [`Statement::fetch`] or by iterating.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    columns: Vec<String>,
    rows: VecDeque<Row>,
    affected_rows: u64,
    last_insert_id: Option<u64>,
}

impl Statement {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    pub fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    pub fn with_last_insert_id(mut self, last_insert_id: Option<u64>) -> Self {
        self.last_insert_id = last_insert_id;
        self
    }

    /// Next row, or `None` once the result set is exhausted
    pub fn fetch(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// All remaining rows
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows.into()
    }

    /// First column of the next row
    pub fn fetch_column(&mut self) -> Option<Value> {
        let row = self.fetch()?;
        match self.columns.first() {
            Some(name) => row.get(name).cloned(),
            None => row.into_iter().next().map(|(_, value)| value),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows not yet fetched
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }
}

impl Iterator for Statement {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch()
    }
}
