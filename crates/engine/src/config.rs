use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReconcileConfig {
    pub name: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub left: TableConfig,
    #[serde(default)]
    pub right: TableConfig,
    pub rules: Vec<RuleConfig>,
}

/// How matched rows are consumed.
///
/// One-to-one consumes each row at most once on either side and is the
/// default: it cannot inflate match counts when keys are duplicated.
/// Many-to-many records every qualifying pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    OneToOne,
    ManyToMany,
}

impl Default for MatchMode {
    fn default() -> Self {
        Self::OneToOne
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneToOne => write!(f, "one_to_one"),
            Self::ManyToMany => write!(f, "many_to_many"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-table config: extraction + filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct TableConfig {
    /// CSV path for CLI loading; ignored when tables are supplied directly.
    pub file: Option<String>,
    #[serde(default)]
    pub extract: Vec<ExtractRule>,
    #[serde(default)]
    pub filter: Vec<FilterRule>,
}

/// Derives `result_column` from `source_column` by pattern matching.
/// Exactly one of `pattern`, `patterns` (flat OR), or `condition`
/// (nested boolean tree) must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRule {
    pub result_column: String,
    pub source_column: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub patterns: Option<Vec<String>>,
    #[serde(default)]
    pub condition: Option<PatternCond>,
    /// Written when nothing matches; Null otherwise.
    #[serde(default)]
    pub fallback: Option<String>,
}

/// One node of a nested pattern tree. Exactly one field per node.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternCond {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub all: Option<Vec<PatternCond>>,
    #[serde(default)]
    pub any: Option<Vec<PatternCond>>,
    #[serde(default)]
    pub not: Option<Box<PatternCond>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl FilterOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterOrEqual | Self::LessThan | Self::LessOrEqual
        )
    }
}

// ---------------------------------------------------------------------------
// Reconciliation rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Left-table column.
    pub left: String,
    /// Right-table column.
    pub right: String,
    pub match_type: MatchType,
    /// Allowed numeric difference for `tolerance`, or day window for
    /// `date_equals`. Zero when absent.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub tolerance_mode: Option<ToleranceMode>,
}

impl RuleConfig {
    pub fn tolerance(&self) -> f64 {
        self.tolerance.unwrap_or(0.0)
    }

    pub fn tolerance_mode(&self) -> ToleranceMode {
        self.tolerance_mode.unwrap_or(ToleranceMode::Absolute)
    }
}

/// The closed set of per-column equivalence semantics. Extending it
/// means adding a variant here and a case to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Equals,
    Tolerance,
    DateEquals,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals => write!(f, "equals"),
            Self::Tolerance => write!(f, "tolerance"),
            Self::DateEquals => write!(f, "date_equals"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    Absolute,
    Percent,
}

// ---------------------------------------------------------------------------
// Parse + validate
// ---------------------------------------------------------------------------

impl ReconcileConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconcileConfig =
            toml::from_str(input).map_err(|e| ReconError::RuleParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        let config: ReconcileConfig =
            serde_json::from_str(input).map_err(|e| ReconError::RuleParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Eager validation: everything fatal about the configuration is
    /// caught here, before any row is touched.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.rules.is_empty() {
            return Err(ReconError::RuleParse(
                "at least one reconciliation rule is required".into(),
            ));
        }

        for (i, rule) in self.rules.iter().enumerate() {
            let n = i + 1;
            if let Some(t) = rule.tolerance {
                if t < 0.0 {
                    return Err(ReconError::RuleParse(format!(
                        "rule {n}: tolerance must be non-negative, got {t}"
                    )));
                }
                match rule.match_type {
                    MatchType::Equals => {
                        return Err(ReconError::RuleParse(format!(
                            "rule {n}: 'equals' does not take a tolerance"
                        )));
                    }
                    MatchType::DateEquals => {
                        if t.fract() != 0.0 {
                            return Err(ReconError::RuleParse(format!(
                                "rule {n}: date tolerance must be a whole number of days, got {t}"
                            )));
                        }
                    }
                    MatchType::Tolerance => {}
                }
            }
            if rule.tolerance_mode.is_some() && rule.match_type != MatchType::Tolerance {
                return Err(ReconError::RuleParse(format!(
                    "rule {n}: tolerance_mode only applies to 'tolerance' rules"
                )));
            }
        }

        for (table_name, table) in [("left", &self.left), ("right", &self.right)] {
            for ex in &table.extract {
                // Compiling checks form exclusivity and every regex.
                crate::extract::compile(ex).map_err(|e| match e {
                    ReconError::RuleParse(msg) => {
                        ReconError::RuleParse(format!("{table_name} extract: {msg}"))
                    }
                    other => other,
                })?;
            }
            for filt in &table.filter {
                if filt.op.is_relational()
                    && crate::rule::parse_number_str(&filt.value).is_none()
                {
                    return Err(ReconError::RuleParse(format!(
                        "{table_name} filter on '{}': relational comparison needs a numeric value, got '{}'",
                        filt.column, filt.value
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
