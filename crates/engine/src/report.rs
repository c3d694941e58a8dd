use serde::Serialize;

use crate::model::{MatchedPair, ReconSummary};

/// Summary statistics for one run. Empty tables yield a 0% rate rather
/// than an error.
pub fn compute_summary(
    left_rows: usize,
    right_rows: usize,
    matched: usize,
    unmatched_left: usize,
    unmatched_right: usize,
    warnings: usize,
    elapsed_ms: u64,
) -> ReconSummary {
    let denominator = left_rows.max(right_rows);
    let match_rate_pct = if denominator == 0 {
        0.0
    } else {
        matched as f64 / denominator as f64 * 100.0
    };

    ReconSummary {
        left_rows,
        right_rows,
        matched,
        unmatched_left,
        unmatched_right,
        match_rate_pct,
        warnings,
        elapsed_ms,
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// A fixed-size window over a result sequence. Pages are zero-based;
/// slicing never re-runs the match.
#[derive(Debug, Serialize)]
pub struct PageView<'a, T> {
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub items: &'a [T],
}

pub fn page<T>(items: &[T], page: usize, page_size: usize) -> PageView<'_, T> {
    if page_size == 0 {
        return PageView {
            page,
            page_size,
            total_items: items.len(),
            total_pages: 0,
            items: &[],
        };
    }
    let total_pages = items.len().div_ceil(page_size);
    let start = page.saturating_mul(page_size).min(items.len());
    let end = (start + page_size).min(items.len());
    PageView {
        page,
        page_size,
        total_items: items.len(),
        total_pages,
        items: &items[start..end],
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Mean match confidence across all matched pairs; 0 when none.
pub fn avg_confidence(matched: &[MatchedPair]) -> f64 {
    if matched.is_empty() {
        return 0.0;
    }
    matched.iter().map(|m| m.record.confidence).sum::<f64>() / matched.len() as f64
}

/// Mean per-rule confidence across all matched pairs, one entry per
/// configured rule.
pub fn per_rule_confidence(matched: &[MatchedPair], rule_count: usize) -> Vec<f64> {
    if matched.is_empty() {
        return vec![0.0; rule_count];
    }
    let mut sums = vec![0.0; rule_count];
    for m in matched {
        for (i, score) in m.record.rule_confidence.iter().enumerate() {
            if i < rule_count {
                sums[i] += score;
            }
        }
    }
    sums.iter().map(|s| s / matched.len() as f64).collect()
}
