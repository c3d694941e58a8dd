use chrono::NaiveDate;

use crate::config::{MatchType, RuleConfig, ToleranceMode};
use crate::model::Value;

/// Float comparisons tolerate accumulated representation error.
const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Normalization + coercion
// ---------------------------------------------------------------------------

/// Canonical text form: trimmed, lowercased.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Parse a cell as a decimal number. Strips common currency symbols,
/// thousands-separator commas and inner spaces; `(123)` reads negative.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => parse_number_str(s),
        _ => None,
    }
}

pub fn parse_number_str(input: &str) -> Option<f64> {
    let mut s = input.trim().to_string();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().map(|n| {
        if negative {
            -n
        } else {
            n
        }
    })
}

/// Accepted textual date formats, most common first. Day-first wins the
/// slash ambiguity; ISO datetimes are truncated to their date part.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = match value {
        Value::Text(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }

    // "2026-01-15T09:30:00" and friends: the date part stands alone.
    if text.len() > 10 {
        if let Ok(d) = NaiveDate::parse_from_str(&text[..10], "%Y-%m-%d") {
            return Some(d);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Outcome of evaluating one rule against one value pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleEval {
    pub satisfied: bool,
    /// 1.0 for exact kinds; for a satisfied tolerance rule with a
    /// positive allowance, how close the values were.
    pub confidence: f64,
    /// The left/right value failed the coercion its match type wanted.
    pub left_unparsed: bool,
    pub right_unparsed: bool,
}

impl RuleEval {
    fn plain(satisfied: bool) -> Self {
        RuleEval {
            satisfied,
            confidence: if satisfied { 1.0 } else { 0.0 },
            left_unparsed: false,
            right_unparsed: false,
        }
    }
}

/// Decide whether two scalar values satisfy one rule.
///
/// `is_key` marks the primary (first) rule: a null on either side of a
/// key rule never matches, while a non-key rule treats two nulls as
/// satisfied (nothing disagrees).
pub fn evaluate(rule: &RuleConfig, left: &Value, right: &Value, is_key: bool) -> RuleEval {
    let l_null = left.is_null();
    let r_null = right.is_null();
    if l_null || r_null {
        return RuleEval::plain(l_null && r_null && !is_key);
    }

    match rule.match_type {
        MatchType::Equals => {
            RuleEval::plain(normalize(&left.as_text()) == normalize(&right.as_text()))
        }
        MatchType::Tolerance => evaluate_tolerance(rule, left, right),
        MatchType::DateEquals => evaluate_date(rule, left, right),
    }
}

fn evaluate_tolerance(rule: &RuleConfig, left: &Value, right: &Value) -> RuleEval {
    let ln = parse_number(left);
    let rn = parse_number(right);

    let (a, b) = match (ln, rn) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            // Fallback: normalized string equality, reported as a warning
            // by the caller via the unparsed flags.
            let satisfied = normalize(&left.as_text()) == normalize(&right.as_text());
            return RuleEval {
                satisfied,
                confidence: if satisfied { 1.0 } else { 0.0 },
                left_unparsed: ln.is_none(),
                right_unparsed: rn.is_none(),
            };
        }
    };

    if a == 0.0 && b == 0.0 {
        return RuleEval::plain(true);
    }

    let allowed = match rule.tolerance_mode() {
        ToleranceMode::Absolute => rule.tolerance(),
        ToleranceMode::Percent => rule.tolerance() / 100.0 * ((a.abs() + b.abs()) / 2.0),
    };
    let diff = (a - b).abs();
    let satisfied = diff <= allowed + EPSILON;

    let confidence = if !satisfied {
        0.0
    } else if allowed > EPSILON {
        (1.0 - diff / allowed).max(0.0)
    } else {
        1.0
    };

    RuleEval {
        satisfied,
        confidence,
        left_unparsed: false,
        right_unparsed: false,
    }
}

fn evaluate_date(rule: &RuleConfig, left: &Value, right: &Value) -> RuleEval {
    let ld = parse_date(left);
    let rd = parse_date(right);

    match (ld, rd) {
        (Some(a), Some(b)) => {
            let window = rule.tolerance() as i64;
            RuleEval::plain((a - b).num_days().abs() <= window)
        }
        // Unparseable dates never match. No string fallback here.
        _ => RuleEval {
            satisfied: false,
            confidence: 0.0,
            left_unparsed: ld.is_none(),
            right_unparsed: rd.is_none(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
