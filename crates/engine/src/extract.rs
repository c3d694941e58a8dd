use regex::Regex;

use crate::config::{ExtractRule, PatternCond};
use crate::error::ReconError;
use crate::model::{Table, Value};

// ---------------------------------------------------------------------------
// Compiled pattern tree
// ---------------------------------------------------------------------------

/// Recursive pattern algebra evaluated per cell.
#[derive(Debug)]
pub enum Pattern {
    Literal(Regex),
    All(Vec<Pattern>),
    Any(Vec<Pattern>),
    Not(Box<Pattern>),
}

#[derive(Debug)]
pub struct CompiledExtract {
    pub result_column: String,
    pub source_column: String,
    pub pattern: Pattern,
    pub fallback: Option<String>,
}

/// Compile one extract rule. Enforces exactly one pattern form and that
/// every regex in the tree compiles.
pub fn compile(rule: &ExtractRule) -> Result<CompiledExtract, ReconError> {
    let forms = [
        rule.pattern.is_some(),
        rule.patterns.is_some(),
        rule.condition.is_some(),
    ]
    .iter()
    .filter(|f| **f)
    .count();
    if forms != 1 {
        return Err(ReconError::RuleParse(format!(
            "'{}': give exactly one of pattern, patterns, or condition",
            rule.result_column
        )));
    }

    let pattern = if let Some(ref p) = rule.pattern {
        Pattern::Literal(compile_regex(&rule.result_column, p)?)
    } else if let Some(ref ps) = rule.patterns {
        if ps.is_empty() {
            return Err(ReconError::RuleParse(format!(
                "'{}': patterns list is empty",
                rule.result_column
            )));
        }
        let compiled = ps
            .iter()
            .map(|p| compile_regex(&rule.result_column, p).map(Pattern::Literal))
            .collect::<Result<Vec<_>, _>>()?;
        Pattern::Any(compiled)
    } else {
        // Safe: forms == 1 guarantees condition is present here.
        let cond = rule.condition.as_ref().ok_or_else(|| {
            ReconError::RuleParse(format!("'{}': missing condition", rule.result_column))
        })?;
        compile_cond(&rule.result_column, cond)?
    };

    Ok(CompiledExtract {
        result_column: rule.result_column.clone(),
        source_column: rule.source_column.clone(),
        pattern,
        fallback: rule.fallback.clone(),
    })
}

fn compile_regex(rule_name: &str, pattern: &str) -> Result<Regex, ReconError> {
    Regex::new(pattern)
        .map_err(|e| ReconError::RuleParse(format!("'{rule_name}': bad pattern: {e}")))
}

fn compile_cond(rule_name: &str, node: &PatternCond) -> Result<Pattern, ReconError> {
    let forms = [
        node.pattern.is_some(),
        node.all.is_some(),
        node.any.is_some(),
        node.not.is_some(),
    ]
    .iter()
    .filter(|f| **f)
    .count();
    if forms != 1 {
        return Err(ReconError::RuleParse(format!(
            "'{rule_name}': each condition node takes exactly one of pattern, all, any, not"
        )));
    }

    if let Some(ref p) = node.pattern {
        return Ok(Pattern::Literal(compile_regex(rule_name, p)?));
    }
    if let Some(ref children) = node.all {
        if children.is_empty() {
            return Err(ReconError::RuleParse(format!(
                "'{rule_name}': 'all' list is empty"
            )));
        }
        let compiled = children
            .iter()
            .map(|c| compile_cond(rule_name, c))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Pattern::All(compiled));
    }
    if let Some(ref children) = node.any {
        if children.is_empty() {
            return Err(ReconError::RuleParse(format!(
                "'{rule_name}': 'any' list is empty"
            )));
        }
        let compiled = children
            .iter()
            .map(|c| compile_cond(rule_name, c))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Pattern::Any(compiled));
    }
    // forms == 1, so `not` is the remaining case.
    let child = node.not.as_ref().ok_or_else(|| {
        ReconError::RuleParse(format!("'{rule_name}': empty condition node"))
    })?;
    Ok(Pattern::Not(Box::new(compile_cond(rule_name, child)?)))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

struct Outcome {
    matched: bool,
    capture: Option<String>,
}

fn eval(pattern: &Pattern, text: &str) -> Outcome {
    match pattern {
        Pattern::Literal(re) => match re.captures(text) {
            Some(caps) => {
                let capture = caps
                    .get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string());
                Outcome {
                    matched: true,
                    capture,
                }
            }
            None => Outcome {
                matched: false,
                capture: None,
            },
        },
        Pattern::Any(children) => {
            for child in children {
                let out = eval(child, text);
                if out.matched {
                    return out;
                }
            }
            Outcome {
                matched: false,
                capture: None,
            }
        }
        Pattern::All(children) => {
            let mut first_capture: Option<String> = None;
            for (i, child) in children.iter().enumerate() {
                let out = eval(child, text);
                if !out.matched {
                    return Outcome {
                        matched: false,
                        capture: None,
                    };
                }
                if i == 0 {
                    first_capture = out.capture;
                }
            }
            Outcome {
                matched: true,
                capture: first_capture,
            }
        }
        Pattern::Not(child) => Outcome {
            matched: !eval(child, text).matched,
            // Negation asserts absence; there is nothing to extract.
            capture: None,
        },
    }
}

/// Apply extraction rules to a table: adds each result column to the
/// column list and writes a value into every row. Existing columns are
/// never removed or mutated.
pub fn apply(table: &mut Table, rules: &[CompiledExtract]) {
    for rule in rules {
        for row in &mut table.rows {
            let text = row.get(&rule.source_column).as_text();
            let out = eval(&rule.pattern, &text);
            let value = match (out.matched, out.capture) {
                (true, Some(cap)) => Value::Text(cap),
                (true, None) => Value::Bool(true),
                (false, _) => rule
                    .fallback
                    .as_ref()
                    .map(|f| Value::Text(f.clone()))
                    .unwrap_or(Value::Null),
            };
            row.cells.insert(rule.result_column.clone(), value);
        }
        if !table.columns.contains(&rule.result_column) {
            table.columns.push(rule.result_column.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractRule;

    fn base_rule() -> ExtractRule {
        ExtractRule {
            result_column: "out".into(),
            source_column: "src".into(),
            pattern: None,
            patterns: None,
            condition: None,
            fallback: None,
        }
    }

    fn table(values: &[&str]) -> Table {
        Table::from_rows(
            "t",
            &["src"],
            values
                .iter()
                .map(|v| vec![Value::Text(v.to_string())])
                .collect(),
        )
    }

    #[test]
    fn single_pattern_extracts_capture_group() {
        let mut rule = base_rule();
        rule.pattern = Some(r"INV-(\d+)".into());
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["ref INV-00412 posted", "no reference"]);
        apply(&mut t, &[compiled]);

        assert_eq!(t.columns, vec!["src", "out"]);
        assert_eq!(t.rows[0].get("out"), &Value::Text("00412".into()));
        assert_eq!(t.rows[1].get("out"), &Value::Null);
    }

    #[test]
    fn whole_match_when_no_capture_group() {
        let mut rule = base_rule();
        rule.pattern = Some(r"\d{4}".into());
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["year 2026 end"]);
        apply(&mut t, &[compiled]);
        assert_eq!(t.rows[0].get("out"), &Value::Text("2026".into()));
    }

    #[test]
    fn flat_patterns_are_ored_first_wins() {
        let mut rule = base_rule();
        rule.patterns = Some(vec![r"INV-(\d+)".into(), r"REF-(\d+)".into()]);
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["REF-77", "INV-12 REF-99"]);
        apply(&mut t, &[compiled]);
        assert_eq!(t.rows[0].get("out"), &Value::Text("77".into()));
        assert_eq!(t.rows[1].get("out"), &Value::Text("12".into()));
    }

    #[test]
    fn nested_condition_tree() {
        // (contains "wire" AND NOT contains "reversal") OR contains "ach"
        let mut rule = base_rule();
        rule.condition = Some(PatternCond {
            pattern: None,
            all: None,
            any: Some(vec![
                PatternCond {
                    pattern: None,
                    all: Some(vec![
                        PatternCond {
                            pattern: Some("(?i)wire".into()),
                            all: None,
                            any: None,
                            not: None,
                        },
                        PatternCond {
                            pattern: None,
                            all: None,
                            any: None,
                            not: Some(Box::new(PatternCond {
                                pattern: Some("(?i)reversal".into()),
                                all: None,
                                any: None,
                                not: None,
                            })),
                        },
                    ]),
                    any: None,
                    not: None,
                },
                PatternCond {
                    pattern: Some("(?i)ach".into()),
                    all: None,
                    any: None,
                    not: None,
                },
            ]),
            not: None,
        });
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["WIRE transfer in", "wire REVERSAL", "ACH credit", "check"]);
        apply(&mut t, &[compiled]);
        assert_eq!(t.rows[0].get("out"), &Value::Text("WIRE".into()));
        assert_eq!(t.rows[1].get("out"), &Value::Null);
        assert_eq!(t.rows[2].get("out"), &Value::Text("ACH".into()));
        assert_eq!(t.rows[3].get("out"), &Value::Null);
    }

    #[test]
    fn not_node_yields_boolean() {
        let mut rule = base_rule();
        rule.condition = Some(PatternCond {
            pattern: None,
            all: None,
            any: None,
            not: Some(Box::new(PatternCond {
                pattern: Some("(?i)void".into()),
                all: None,
                any: None,
                not: None,
            })),
        });
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["payment", "VOIDED payment"]);
        apply(&mut t, &[compiled]);
        assert_eq!(t.rows[0].get("out"), &Value::Bool(true));
        assert_eq!(t.rows[1].get("out"), &Value::Null);
    }

    #[test]
    fn fallback_written_on_no_match() {
        let mut rule = base_rule();
        rule.pattern = Some(r"INV-(\d+)".into());
        rule.fallback = Some("unknown".into());
        let compiled = compile(&rule).unwrap();

        let mut t = table(&["nothing here"]);
        apply(&mut t, &[compiled]);
        assert_eq!(t.rows[0].get("out"), &Value::Text("unknown".into()));
    }

    #[test]
    fn reject_zero_or_two_forms() {
        let rule = base_rule();
        assert!(compile(&rule).is_err());

        let mut rule = base_rule();
        rule.pattern = Some("a".into());
        rule.patterns = Some(vec!["b".into()]);
        assert!(compile(&rule).is_err());
    }

    #[test]
    fn reject_empty_condition_lists() {
        let mut rule = base_rule();
        rule.condition = Some(PatternCond {
            pattern: None,
            all: Some(vec![]),
            any: None,
            not: None,
        });
        assert!(compile(&rule).is_err());
    }

    #[test]
    fn chained_extracts_can_read_derived_columns() {
        let mut first = base_rule();
        first.pattern = Some(r"INV-(\d+)".into());
        let mut second = base_rule();
        second.result_column = "padded".into();
        second.source_column = "out".into();
        second.pattern = Some(r"^0*(\d+)$".into());

        let compiled = vec![compile(&first).unwrap(), compile(&second).unwrap()];
        let mut t = table(&["INV-00412"]);
        apply(&mut t, &compiled);
        assert_eq!(t.rows[0].get("padded"), &Value::Text("412".into()));
    }
}
