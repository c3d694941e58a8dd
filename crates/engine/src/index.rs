use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::config::{MatchType, RuleConfig};
use crate::error::{Expected, WarningLog};
use crate::model::{Side, Table, Value};
use crate::rule::{normalize, parse_date, parse_number};

/// Coarse numeric bucketing: two decimal places.
const NUM_SCALE: f64 = 100.0;
/// Beyond this, scaling to i64 would overflow; fall back to text keys.
const NUM_KEY_LIMIT: f64 = 9.0e15;

/// Normalized bucket key for the primary rule's column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Text(String),
    Num(i64),
    Date(NaiveDate),
}

/// Buckets of right-table row positions keyed by normalized primary key.
/// Lookup is O(1) per probe, bounding candidate scans to one bucket (or
/// a small fixed neighborhood) instead of the whole table.
#[derive(Debug)]
pub struct RightIndex {
    buckets: HashMap<IndexKey, Vec<usize>>,
}

/// Normalize one cell under the primary rule's match type.
/// `None` means the cell can never match: null/empty keys, or dates that
/// do not parse under `date_equals`.
pub fn key_for(value: &Value, match_type: MatchType) -> Option<IndexKey> {
    if value.is_null() {
        return None;
    }
    match match_type {
        MatchType::Equals => Some(IndexKey::Text(normalize(&value.as_text()))),
        MatchType::Tolerance => match parse_number(value) {
            Some(n) => Some(num_key(n)),
            // Unparseable cells bucket by text so the string-equality
            // fallback still finds its counterpart.
            None => Some(IndexKey::Text(normalize(&value.as_text()))),
        },
        MatchType::DateEquals => parse_date(value).map(IndexKey::Date),
    }
}

fn num_key(n: f64) -> IndexKey {
    let scaled = (n * NUM_SCALE).round();
    if !scaled.is_finite() || scaled.abs() > NUM_KEY_LIMIT {
        return IndexKey::Text(normalize(&format!("{n}")));
    }
    IndexKey::Num(scaled as i64)
}

/// Build the index over the right table for the primary rule.
pub fn build(table: &Table, key_rule: &RuleConfig, log: &mut WarningLog) -> RightIndex {
    let mut buckets: HashMap<IndexKey, Vec<usize>> = HashMap::new();

    for (pos, row) in table.rows.iter().enumerate() {
        let cell = row.get(&key_rule.right);
        if let Some(key) = key_for(cell, key_rule.match_type) {
            if matches!((&key, key_rule.match_type), (IndexKey::Text(_), MatchType::Tolerance)) {
                log.push(
                    Side::Right,
                    row.index,
                    &key_rule.right,
                    &cell.as_text(),
                    Expected::Number,
                );
            }
            buckets.entry(key).or_default().push(pos);
        } else if !cell.is_null() && key_rule.match_type == MatchType::DateEquals {
            log.push(
                Side::Right,
                row.index,
                &key_rule.right,
                &cell.as_text(),
                Expected::Date,
            );
        }
    }

    RightIndex { buckets }
}

impl RightIndex {
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Candidate right-row positions for a left cell, in deterministic
    /// order. Probes the matching bucket; for non-zero numeric tolerance
    /// the two neighbor buckets as well (boundary-straddling near-exact
    /// pairs); for a date window, each date in the window. Values that
    /// could only match across a tolerance span wider than one coarse
    /// bucket are not found.
    pub fn candidates(&self, value: &Value, key_rule: &RuleConfig) -> Vec<usize> {
        let key = match key_for(value, key_rule.match_type) {
            Some(k) => k,
            None => return Vec::new(),
        };

        match (&key, key_rule.match_type) {
            (IndexKey::Num(k), MatchType::Tolerance) if key_rule.tolerance() > 0.0 => {
                let mut out = Vec::new();
                for probe in [k - 1, *k, k + 1] {
                    if let Some(bucket) = self.buckets.get(&IndexKey::Num(probe)) {
                        out.extend_from_slice(bucket);
                    }
                }
                out
            }
            (IndexKey::Date(d), MatchType::DateEquals) if key_rule.tolerance() > 0.0 => {
                let window = key_rule.tolerance() as i64;
                let mut out = Vec::new();
                for off in -window..=window {
                    let probe = *d + Duration::days(off);
                    if let Some(bucket) = self.buckets.get(&IndexKey::Date(probe)) {
                        out.extend_from_slice(bucket);
                    }
                }
                out
            }
            _ => self.buckets.get(&key).cloned().unwrap_or_default(),
        }
    }
}
