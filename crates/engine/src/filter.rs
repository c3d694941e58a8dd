use crate::config::{FilterOp, FilterRule};
use crate::error::{Expected, WarningLog};
use crate::model::{Side, Table, Value};
use crate::rule::{normalize, parse_number, parse_number_str};

/// Drop rows that fail any filter. Order-preserving; surviving rows keep
/// their original `index`.
pub fn apply(table: &mut Table, filters: &[FilterRule], side: Side, log: &mut WarningLog) {
    if filters.is_empty() {
        return;
    }
    let rows = std::mem::take(&mut table.rows);
    table.rows = rows
        .into_iter()
        .filter(|row| {
            filters
                .iter()
                .all(|f| passes(row.get(&f.column), f, side, row.index, log))
        })
        .collect();
}

fn passes(cell: &Value, filter: &FilterRule, side: Side, row: usize, log: &mut WarningLog) -> bool {
    match filter.op {
        FilterOp::Equals => normalize(&cell.as_text()) == normalize(&filter.value),
        FilterOp::NotEquals => normalize(&cell.as_text()) != normalize(&filter.value),
        FilterOp::Contains => cell
            .as_text()
            .to_lowercase()
            .contains(&filter.value.trim().to_lowercase()),
        _ => {
            let cell_n = match parse_number(cell) {
                Some(n) => n,
                None => {
                    // Relational filter on an unparseable cell drops the
                    // row and logs; one bad cell must not abort the run.
                    if !cell.is_null() {
                        log.push(side, row, &filter.column, &cell.as_text(), Expected::Number);
                    }
                    return false;
                }
            };
            // Validated parseable at config time.
            let wanted = match parse_number_str(&filter.value) {
                Some(n) => n,
                None => return false,
            };
            match filter.op {
                FilterOp::GreaterThan => cell_n > wanted,
                FilterOp::GreaterOrEqual => cell_n >= wanted,
                FilterOp::LessThan => cell_n < wanted,
                FilterOp::LessOrEqual => cell_n <= wanted,
                _ => unreachable!("non-relational ops handled above"),
            }
        }
    }
}
