use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::MatchMode;
use crate::error::CoercionWarning;

// ---------------------------------------------------------------------------
// Values and tables
// ---------------------------------------------------------------------------

/// A scalar cell value. Dates travel as `Text` and are parsed on demand
/// by the rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Null, or text that trims to nothing.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render to text for string comparison and pattern matching.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format!("{n}"),
            Value::Text(s) => s.clone(),
        }
    }
}

/// Which side of the reconciliation a table or cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A single row. `index` is the position in the originally loaded table
/// and survives filtering unchanged, so unmatched reporting can refer
/// back to the source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    pub cells: HashMap<String, Value>,
}

impl Row {
    /// Cell value by column; absent cells read as Null.
    pub fn get(&self, column: &str) -> &Value {
        self.cells.get(column).unwrap_or(&Value::Null)
    }
}

/// An ordered sequence of rows sharing one column set.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Build a table from parallel row values, assigning original indices
    /// in order. Rows shorter than `columns` are padded with Null.
    pub fn from_rows(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                let mut cells = HashMap::new();
                for (i, col) in columns.iter().enumerate() {
                    let v = values.get(i).cloned().unwrap_or(Value::Null);
                    cells.insert(col.clone(), v);
                }
                Row { index, cells }
            })
            .collect();
        Table {
            name: name.to_string(),
            columns,
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Match records
// ---------------------------------------------------------------------------

/// One matched left/right pairing. `matched_on` names the column pairs
/// the rule list compared; `confidence` is the mean per-rule score.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub left_index: usize,
    pub right_index: usize,
    pub matched_on: String,
    pub confidence: f64,
    pub rule_confidence: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPair {
    pub record: MatchRecord,
    pub left: Row,
    pub right: Row,
}

// ---------------------------------------------------------------------------
// Summary + result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconSummary {
    /// Row counts after filtering, i.e. what the matcher actually saw.
    pub left_rows: usize,
    pub right_rows: usize,
    pub matched: usize,
    pub unmatched_left: usize,
    pub unmatched_right: usize,
    /// matched / max(left_rows, right_rows), as a percentage.
    pub match_rate_pct: f64,
    pub warnings: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub mode: MatchMode,
    pub engine_version: String,
    pub run_at: String,
}

/// The complete output of one reconciliation run. Immutable once built;
/// storage and export belong to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: RunMeta,
    pub summary: ReconSummary,
    pub matched: Vec<MatchedPair>,
    pub unmatched_left: Vec<Row>,
    pub unmatched_right: Vec<Row>,
    pub warnings: Vec<CoercionWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_nullness() {
        assert!(Value::Null.is_null());
        assert!(Value::Text("   ".into()).is_null());
        assert!(!Value::Text("0".into()).is_null());
        assert!(!Value::Number(0.0).is_null());
        assert!(!Value::Bool(false).is_null());
    }

    #[test]
    fn value_text_rendering() {
        assert_eq!(Value::Number(1.0).as_text(), "1");
        assert_eq!(Value::Number(1.5).as_text(), "1.5");
        assert_eq!(Value::Bool(true).as_text(), "true");
        assert_eq!(Value::Null.as_text(), "");
    }

    #[test]
    fn value_untagged_json() {
        let v: Value = serde_json::from_str("null").unwrap();
        assert_eq!(v, Value::Null);
        let v: Value = serde_json::from_str("3.25").unwrap();
        assert_eq!(v, Value::Number(3.25));
        let v: Value = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(v, Value::Text("abc".into()));
        let v: Value = serde_json::from_str("true").unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn table_from_rows_pads_missing() {
        let t = Table::from_rows(
            "t",
            &["a", "b"],
            vec![vec![Value::Text("x".into())]],
        );
        assert_eq!(t.rows[0].get("a"), &Value::Text("x".into()));
        assert_eq!(t.rows[0].get("b"), &Value::Null);
        assert_eq!(t.rows[0].index, 0);
    }
}
