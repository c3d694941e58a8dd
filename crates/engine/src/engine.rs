use std::collections::HashSet;
use std::time::Instant;

use crate::config::{MatchMode, MatchType, ReconcileConfig, TableConfig};
use crate::error::{Expected, MissingColumn, ReconError, WarningLog};
use crate::extract::{self, CompiledExtract};
use crate::filter;
use crate::index;
use crate::model::{
    MatchRecord, MatchedPair, ReconResult, Row, RunMeta, Side, Table, Value,
};
use crate::report;
use crate::rule;

/// Run one reconciliation: extraction, filtering, indexing, matching,
/// aggregation. Pure over its inputs; deterministic for identical inputs
/// and configuration.
pub fn run(
    config: &ReconcileConfig,
    left: &Table,
    right: &Table,
) -> Result<ReconResult, ReconError> {
    let started = Instant::now();
    config.validate()?;

    let missing = check_columns(config, left, right);
    if !missing.is_empty() {
        return Err(ReconError::MissingColumns(missing));
    }

    let left_extracts = compile_extracts(&config.left)?;
    let right_extracts = compile_extracts(&config.right)?;

    let mut log = WarningLog::new();
    let mut left_t = left.clone();
    let mut right_t = right.clone();

    extract::apply(&mut left_t, &left_extracts);
    extract::apply(&mut right_t, &right_extracts);
    filter::apply(&mut left_t, &config.left.filter, Side::Left, &mut log);
    filter::apply(&mut right_t, &config.right.filter, Side::Right, &mut log);
    tracing::debug!(
        left_rows = left_t.rows.len(),
        right_rows = right_t.rows.len(),
        "tables prepared"
    );

    let key_rule = &config.rules[0];
    let right_index = index::build(&right_t, key_rule, &mut log);
    tracing::debug!(buckets = right_index.bucket_count(), "right index built");

    let matched_on: String = config
        .rules
        .iter()
        .map(|r| format!("{}={}", r.left, r.right))
        .collect::<Vec<_>>()
        .join(",");

    let mut matched: Vec<MatchedPair> = Vec::new();
    let mut left_matched = vec![false; left_t.rows.len()];
    let mut right_matched = vec![false; right_t.rows.len()];
    // One-to-one: a right row is consumed by its first match.
    let mut consumed = vec![false; right_t.rows.len()];
    let one_to_one = config.mode == MatchMode::OneToOne;

    for (li, left_row) in left_t.rows.iter().enumerate() {
        let key_cell = left_row.get(&key_rule.left);
        for ri in right_index.candidates(key_cell, key_rule) {
            if one_to_one && consumed[ri] {
                continue;
            }
            let right_row = &right_t.rows[ri];
            if let Some(scores) =
                evaluate_all(config, left_row, right_row, &mut log)
            {
                let confidence = scores.iter().sum::<f64>() / scores.len() as f64;
                matched.push(MatchedPair {
                    record: MatchRecord {
                        left_index: left_row.index,
                        right_index: right_row.index,
                        matched_on: matched_on.clone(),
                        confidence,
                        rule_confidence: scores,
                    },
                    left: left_row.clone(),
                    right: right_row.clone(),
                });
                left_matched[li] = true;
                right_matched[ri] = true;
                if one_to_one {
                    consumed[ri] = true;
                    break;
                }
            }
        }
    }

    let unmatched_left: Vec<Row> = left_t
        .rows
        .iter()
        .zip(&left_matched)
        .filter(|(_, m)| !**m)
        .map(|(r, _)| r.clone())
        .collect();
    let unmatched_right: Vec<Row> = right_t
        .rows
        .iter()
        .zip(&right_matched)
        .filter(|(_, m)| !**m)
        .map(|(r, _)| r.clone())
        .collect();

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let summary = report::compute_summary(
        left_t.rows.len(),
        right_t.rows.len(),
        matched.len(),
        unmatched_left.len(),
        unmatched_right.len(),
        log.count(),
        elapsed_ms,
    );
    tracing::info!(
        matched = summary.matched,
        unmatched_left = summary.unmatched_left,
        unmatched_right = summary.unmatched_right,
        elapsed_ms,
        "reconciliation complete"
    );

    Ok(ReconResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            mode: config.mode,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        matched,
        unmatched_left,
        unmatched_right,
        warnings: log.into_entries(),
    })
}

/// Evaluate every rule conjunctively. `Some(scores)` when all satisfied.
fn evaluate_all(
    config: &ReconcileConfig,
    left_row: &Row,
    right_row: &Row,
    log: &mut WarningLog,
) -> Option<Vec<f64>> {
    let mut scores = Vec::with_capacity(config.rules.len());
    for (i, r) in config.rules.iter().enumerate() {
        let lv = left_row.get(&r.left);
        let rv = right_row.get(&r.right);
        let ev = rule::evaluate(r, lv, rv, i == 0);

        let expected = match r.match_type {
            MatchType::Tolerance => Some(Expected::Number),
            MatchType::DateEquals => Some(Expected::Date),
            MatchType::Equals => None,
        };
        if let Some(expected) = expected {
            if ev.left_unparsed && !lv.is_null() {
                log.push(Side::Left, left_row.index, &r.left, &lv.as_text(), expected);
            }
            if ev.right_unparsed && !rv.is_null() {
                log.push(Side::Right, right_row.index, &r.right, &rv.as_text(), expected);
            }
        }

        if !ev.satisfied {
            return None;
        }
        scores.push(ev.confidence);
    }
    Some(scores)
}

fn compile_extracts(table: &TableConfig) -> Result<Vec<CompiledExtract>, ReconError> {
    table.extract.iter().map(extract::compile).collect()
}

/// Every missing column across extract sources, filter columns and rule
/// columns, validated against the column set each stage will actually
/// see (extraction grows it in rule order).
fn check_columns(config: &ReconcileConfig, left: &Table, right: &Table) -> Vec<MissingColumn> {
    let mut missing = Vec::new();

    let sides = [
        (Side::Left, &config.left, left),
        (Side::Right, &config.right, right),
    ];
    for (side, table_config, table) in sides {
        let mut columns: HashSet<String> = table.columns.iter().cloned().collect();

        for ex in &table_config.extract {
            if !columns.contains(&ex.source_column) {
                missing.push(missing_entry(
                    side,
                    &ex.source_column,
                    format!("extract '{}'", ex.result_column),
                    &columns,
                ));
            }
            columns.insert(ex.result_column.clone());
        }
        for f in &table_config.filter {
            if !columns.contains(&f.column) {
                missing.push(missing_entry(side, &f.column, "filter".to_string(), &columns));
            }
        }
        for (i, r) in config.rules.iter().enumerate() {
            let column = match side {
                Side::Left => &r.left,
                Side::Right => &r.right,
            };
            if !columns.contains(column) {
                missing.push(missing_entry(side, column, format!("rule {}", i + 1), &columns));
            }
        }
    }

    missing
}

fn missing_entry(
    side: Side,
    column: &str,
    referenced_by: String,
    columns: &HashSet<String>,
) -> MissingColumn {
    let mut available: Vec<String> = columns.iter().cloned().collect();
    available.sort();
    MissingColumn {
        side,
        column: column.to_string(),
        referenced_by,
        available,
    }
}

// ---------------------------------------------------------------------------
// Table loading
// ---------------------------------------------------------------------------

/// Load a headered CSV into a table. Every cell loads as text; the rule
/// evaluator coerces on demand, so `equals` stays literal.
pub fn load_csv_table(name: &str, csv_data: &str) -> Result<Table, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ReconError::Csv(e.to_string()))?;
        let mut cells = std::collections::HashMap::new();
        for (i, col) in columns.iter().enumerate() {
            let raw = record.get(i).unwrap_or("");
            let value = if raw.is_empty() {
                Value::Null
            } else {
                Value::Text(raw.to_string())
            };
            cells.insert(col.clone(), value);
        }
        rows.push(Row { index, cells });
    }

    Ok(Table {
        name: name.to_string(),
        columns,
        rows,
    })
}

/// Load a JSON array of objects into a table. Column order follows first
/// appearance; absent keys read as Null.
pub fn load_json_table(name: &str, json_data: &str) -> Result<Table, ReconError> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(json_data).map_err(|e| ReconError::Json(e.to_string()))?;

    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for record in &records {
        for key in record.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let mut cells = std::collections::HashMap::new();
            for (key, value) in record {
                let v: Value = serde_json::from_value(value)
                    .map_err(|e| ReconError::Json(e.to_string()))?;
                cells.insert(key, v);
            }
            Ok(Row { index, cells })
        })
        .collect::<Result<Vec<_>, ReconError>>()?;

    Ok(Table {
        name: name.to_string(),
        columns,
        rows,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;

    fn config(toml_str: &str) -> ReconcileConfig {
        ReconcileConfig::from_toml(toml_str).unwrap()
    }

    const KEY_ONLY: &str = r#"
name = "t"
[[rules]]
left = "id"
right = "id"
match_type = "equals"
"#;

    #[test]
    fn load_csv_basic() {
        let csv = "\
id,amount,date
a1,100,2026-01-15
a2,,2026-01-16
";
        let t = load_csv_table("left", csv).unwrap();
        assert_eq!(t.columns, vec!["id", "amount", "date"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0].get("amount"), &Value::Text("100".into()));
        assert_eq!(t.rows[1].get("amount"), &Value::Null);
        assert_eq!(t.rows[1].index, 1);
    }

    #[test]
    fn load_json_unions_columns() {
        let json = r#"[
            {"id": "a1", "amount": 100.5},
            {"id": "a2", "note": "late"}
        ]"#;
        let t = load_json_table("left", json).unwrap();
        assert_eq!(t.columns, vec!["id", "amount", "note"]);
        assert_eq!(t.rows[0].get("amount"), &Value::Number(100.5));
        assert_eq!(t.rows[0].get("note"), &Value::Null);
    }

    #[test]
    fn missing_columns_abort_before_matching() {
        let cfg = config(
            r#"
name = "t"
[[left.filter]]
column = "status"
op = "equals"
value = "ok"

[[rules]]
left = "id"
right = "ref"
match_type = "equals"
"#,
        );
        let left = Table::from_rows("l", &["id"], vec![vec![Value::Text("1".into())]]);
        let right = Table::from_rows("r", &["other"], vec![vec![Value::Text("1".into())]]);

        let err = run(&cfg, &left, &right).unwrap_err();
        match err {
            ReconError::MissingColumns(cols) => {
                // status (left filter) and ref (right rule 1).
                assert_eq!(cols.len(), 2);
                assert_eq!(cols[0].column, "status");
                assert_eq!(cols[0].referenced_by, "filter");
                assert_eq!(cols[1].column, "ref");
                assert_eq!(cols[1].side, Side::Right);
                assert_eq!(cols[1].available, vec!["other".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other}"),
        }
    }

    #[test]
    fn extract_result_columns_satisfy_rule_validation() {
        let cfg = config(
            r#"
name = "t"
[[left.extract]]
result_column = "invoice_no"
source_column = "memo"
pattern = "INV-(\\d+)"

[[rules]]
left = "invoice_no"
right = "ref"
match_type = "equals"
"#,
        );
        let left = Table::from_rows(
            "l",
            &["memo"],
            vec![vec![Value::Text("paid INV-42".into())]],
        );
        let right = Table::from_rows("r", &["ref"], vec![vec![Value::Text("42".into())]]);

        let result = run(&cfg, &left, &right).unwrap();
        assert_eq!(result.summary.matched, 1);
    }

    #[test]
    fn one_to_one_consumes_right_rows() {
        let cfg = config(KEY_ONLY);
        let left = Table::from_rows(
            "l",
            &["id"],
            vec![
                vec![Value::Text("x".into())],
                vec![Value::Text("x".into())],
                vec![Value::Text("y".into())],
            ],
        );
        let right = Table::from_rows(
            "r",
            &["id"],
            vec![vec![Value::Text("x".into())], vec![Value::Text("z".into())]],
        );

        let result = run(&cfg, &left, &right).unwrap();
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.summary.unmatched_left, 2);
        assert_eq!(result.summary.unmatched_right, 1);
        // Partition invariants.
        assert_eq!(result.summary.matched + result.summary.unmatched_left, 3);
        assert_eq!(result.summary.matched + result.summary.unmatched_right, 2);
        // First left occurrence won the right row.
        assert_eq!(result.matched[0].record.left_index, 0);
    }

    #[test]
    fn many_to_many_records_every_pairing() {
        let mut cfg = config(KEY_ONLY);
        cfg.mode = MatchMode::ManyToMany;
        let electronics = || vec![Value::Text("Electronics".into())];
        let left = Table::from_rows("l", &["id"], vec![electronics(), electronics()]);
        let right = Table::from_rows("r", &["id"], vec![electronics(), electronics()]);

        let result = run(&cfg, &left, &right).unwrap();
        assert_eq!(result.summary.matched, 4);
        assert_eq!(result.summary.unmatched_left, 0);
        assert_eq!(result.summary.unmatched_right, 0);
    }

    #[test]
    fn conjunctive_rules_all_must_hold() {
        let cfg = config(
            r#"
name = "t"
[[rules]]
left = "id"
right = "id"
match_type = "equals"

[[rules]]
left = "amount"
right = "amount"
match_type = "tolerance"
"#,
        );
        let left = Table::from_rows(
            "l",
            &["id", "amount"],
            vec![vec![Value::Text("a".into()), Value::Text("100".into())]],
        );
        let right = Table::from_rows(
            "r",
            &["id", "amount"],
            vec![vec![Value::Text("a".into()), Value::Text("101".into())]],
        );

        let result = run(&cfg, &left, &right).unwrap();
        assert_eq!(result.summary.matched, 0);
        assert_eq!(result.summary.unmatched_left, 1);
        assert_eq!(result.summary.unmatched_right, 1);
    }

    #[test]
    fn warnings_surface_without_aborting() {
        let cfg = config(
            r#"
name = "t"
[[rules]]
left = "id"
right = "id"
match_type = "equals"

[[rules]]
left = "amount"
right = "amount"
match_type = "tolerance"
"#,
        );
        let left = Table::from_rows(
            "l",
            &["id", "amount"],
            vec![vec![Value::Text("a".into()), Value::Text("N/A".into())]],
        );
        let right = Table::from_rows(
            "r",
            &["id", "amount"],
            vec![vec![Value::Text("a".into()), Value::Text("n/a".into())]],
        );

        let result = run(&cfg, &left, &right).unwrap();
        // String fallback matched; both cells warned.
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn idempotent_partitions() {
        let cfg = config(KEY_ONLY);
        let left = Table::from_rows(
            "l",
            &["id"],
            (0..50)
                .map(|i| vec![Value::Text(format!("k{}", i % 7))])
                .collect(),
        );
        let right = Table::from_rows(
            "r",
            &["id"],
            (0..30)
                .map(|i| vec![Value::Text(format!("k{}", i % 11))])
                .collect(),
        );

        let a = run(&cfg, &left, &right).unwrap();
        let b = run(&cfg, &left, &right).unwrap();
        let pairs = |r: &ReconResult| {
            r.matched
                .iter()
                .map(|m| (m.record.left_index, m.record.right_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&a), pairs(&b));
        assert_eq!(
            a.unmatched_left.iter().map(|r| r.index).collect::<Vec<_>>(),
            b.unmatched_left.iter().map(|r| r.index).collect::<Vec<_>>()
        );
        assert_eq!(a.summary.matched, b.summary.matched);
        assert_eq!(a.summary.match_rate_pct, b.summary.match_rate_pct);
    }
}
