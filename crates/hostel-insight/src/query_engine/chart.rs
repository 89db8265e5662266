//! Chart-type inference over arbitrary result rows.
//!
//! The heuristic is first-match and order-sensitive: the first numeric column
//! and the first categorical column (in select-list order) drive the chart.

use serde::{Deserialize, Serialize};

use super::row::{CellValue, Row};

const SAMPLE_ROWS: usize = 50;
const NUMERIC_THRESHOLD_CAP: usize = 5;
const MAX_PIE_SLICES: usize = 10;

/// Caller preference for category charts. `auto` is the absence of an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartOverride {
    Pie,
    Bar,
}

impl ChartOverride {
    /// Parses a client hint. Unknown values and `auto` mean no override.
    pub fn parse(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "pie" => Some(ChartOverride::Pie),
            "bar" => Some(ChartOverride::Bar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChartSpec {
    Pie {
        label_column: String,
        value_column: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Bar {
        label_column: String,
        value_column: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Line {
        column: String,
        x: Vec<usize>,
        y: Vec<f64>,
    },
}

impl ChartSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ChartSpec::Pie { .. } => "pie",
            ChartSpec::Bar { .. } => "bar",
            ChartSpec::Line { .. } => "line",
        }
    }
}

/// Decides how to visualize `rows`. Returns `None` when no chart fits,
/// including for an empty row set.
pub fn infer(rows: &[Row], chart_override: Option<ChartOverride>) -> Option<ChartSpec> {
    let first = rows.first()?;
    let columns: Vec<&str> = first.columns().collect();
    if columns.is_empty() {
        return None;
    }

    let threshold = NUMERIC_THRESHOLD_CAP.min(rows.len() / 2);
    let sample = &rows[..rows.len().min(SAMPLE_ROWS)];
    let numeric: Vec<bool> = columns
        .iter()
        .map(|col| numeric_count(sample, col) >= threshold)
        .collect();

    let mut num_col = columns.iter().zip(&numeric).find(|(_, n)| **n).map(|(c, _)| *c);
    let mut cat_col = columns.iter().zip(&numeric).find(|(_, n)| !**n).map(|(c, _)| *c);

    if columns.len() == 2 && numeric.iter().filter(|n| **n).count() == 1 {
        let idx = numeric.iter().position(|n| *n).unwrap_or(0);
        num_col = Some(columns[idx]);
        cat_col = Some(columns[1 - idx]);
    }

    match (cat_col, num_col) {
        (Some(cat), Some(num)) => {
            let labels: Vec<String> = rows.iter().map(|r| label_of(r, cat)).collect();
            let values: Vec<f64> = rows.iter().map(|r| value_of(r, num)).collect();
            let pie = chart_override == Some(ChartOverride::Pie)
                || (labels.len() <= MAX_PIE_SLICES && chart_override != Some(ChartOverride::Bar));
            let (label_column, value_column) = (cat.to_string(), num.to_string());
            Some(if pie {
                ChartSpec::Pie { label_column, value_column, labels, values }
            } else {
                ChartSpec::Bar { label_column, value_column, labels, values }
            })
        }
        (None, Some(num)) if columns.len() == 1 => Some(ChartSpec::Line {
            column: num.to_string(),
            x: (1..=rows.len()).collect(),
            y: rows.iter().map(|r| value_of(r, num)).collect(),
        }),
        _ => None,
    }
}

fn numeric_count(sample: &[Row], column: &str) -> usize {
    sample
        .iter()
        .filter(|r| r.get(column).and_then(CellValue::try_parse_numeric).is_some())
        .count()
}

fn label_of(row: &Row, column: &str) -> String {
    row.get(column).map(CellValue::to_label).unwrap_or_default()
}

fn value_of(row: &Row, column: &str) -> f64 {
    row.get(column)
        .and_then(CellValue::try_parse_numeric)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn category_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new().with("block", format!("B{}", i)).with("seats", i as i64))
            .collect()
    }

    #[test]
    fn test_two_blocks_make_a_pie() {
        let rows = vec![
            Row::new().with("block", "A").with("seats", 10i64),
            Row::new().with("block", "B").with("seats", 5i64),
        ];
        let chart = infer(&rows, None).unwrap();
        assert_eq!(
            chart,
            ChartSpec::Pie {
                label_column: "block".into(),
                value_column: "seats".into(),
                labels: vec!["A".into(), "B".into()],
                values: vec![10.0, 5.0],
            }
        );
    }

    #[test]
    fn test_single_numeric_column_makes_a_line() {
        let rows: Vec<Row> = [3i64, 7, 2].iter().map(|c| Row::new().with("count", *c)).collect();
        match infer(&rows, None).unwrap() {
            ChartSpec::Line { column, x, y } => {
                assert_eq!(column, "count");
                assert_eq!(x, vec![1, 2, 3]);
                assert_eq!(y, vec![3.0, 7.0, 2.0]);
            }
            other => panic!("expected line chart, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_rows_have_no_chart() {
        assert_eq!(infer(&[], None), None);
        assert_eq!(infer(&[Row::new()], Some(ChartOverride::Pie)), None);
    }

    #[test]
    fn test_pie_bar_boundary() {
        assert_eq!(infer(&category_rows(10), None).unwrap().kind(), "pie");
        assert_eq!(infer(&category_rows(11), None).unwrap().kind(), "bar");
        assert_eq!(infer(&category_rows(11), Some(ChartOverride::Pie)).unwrap().kind(), "pie");
        assert_eq!(infer(&category_rows(3), Some(ChartOverride::Bar)).unwrap().kind(), "bar");
    }

    #[test]
    fn test_nulls_become_empty_labels_and_zero_values() {
        let rows = vec![
            Row::new().with("gender", CellValue::Null).with("total", 4i64),
            Row::new().with("gender", "F").with("total", CellValue::Null),
            Row::new().with("gender", "M").with("total", "6"),
        ];
        match infer(&rows, Some(ChartOverride::Bar)).unwrap() {
            ChartSpec::Bar { labels, values, .. } => {
                assert_eq!(labels, vec!["", "F", "M"]);
                assert_eq!(values, vec![4.0, 0.0, 6.0]);
            }
            other => panic!("expected bar chart, got {:?}", other),
        }
    }

    #[test]
    fn test_first_match_selection_ignores_later_columns() {
        let rows: Vec<Row> = (0..4)
            .map(|i| {
                Row::new()
                    .with("room", format!("R{}", i))
                    .with("occupied", i as i64)
                    .with("hall", "North")
                    .with("capacity", 4i64)
            })
            .collect();
        match infer(&rows, None).unwrap() {
            ChartSpec::Pie { label_column, value_column, .. } => {
                assert_eq!(label_column, "room");
                assert_eq!(value_column, "occupied");
            }
            other => panic!("expected pie chart, got {:?}", other),
        }
    }

    #[test]
    fn test_two_numeric_columns_have_no_chart() {
        let rows: Vec<Row> = (0..6)
            .map(|i| Row::new().with("year", 2020 + i as i64).with("bookings", i as i64))
            .collect();
        assert_eq!(infer(&rows, None), None);
    }

    #[test]
    fn test_single_text_column_has_no_chart() {
        let rows: Vec<Row> = ["a", "b", "c"].iter().map(|s| Row::new().with("name", *s)).collect();
        assert_eq!(infer(&rows, None), None);
    }

    #[test]
    fn test_override_parse() {
        assert_eq!(ChartOverride::parse("PIE"), Some(ChartOverride::Pie));
        assert_eq!(ChartOverride::parse("bar"), Some(ChartOverride::Bar));
        assert_eq!(ChartOverride::parse("auto"), None);
    }

    proptest! {
        #[test]
        fn prop_single_numeric_column_is_line(values in proptest::collection::vec(-1000i64..1000, 1..80)) {
            let rows: Vec<Row> = values.iter().map(|v| Row::new().with("n", *v)).collect();
            match infer(&rows, None) {
                Some(ChartSpec::Line { x, y, .. }) => {
                    prop_assert_eq!(x, (1..=values.len()).collect::<Vec<_>>());
                    prop_assert_eq!(y, values.iter().map(|v| *v as f64).collect::<Vec<_>>());
                }
                other => prop_assert!(false, "expected line chart, got {:?}", other),
            }
        }

        #[test]
        fn prop_pie_exactly_up_to_ten_categories(n in 2usize..40) {
            let kind = infer(&category_rows(n), None).map(|c| c.kind());
            prop_assert_eq!(kind, Some(if n <= 10 { "pie" } else { "bar" }));
        }

        #[test]
        fn prop_first_columns_win_regardless_of_trailing_columns(extra in 0usize..4, n in 2usize..20) {
            let rows: Vec<Row> = (0..n)
                .map(|i| {
                    let mut row = Row::new()
                        .with("label", format!("L{}", i))
                        .with("value", i as i64);
                    for e in 0..extra {
                        row.push(format!("num_{}", e), (i * e) as i64);
                        row.push(format!("text_{}", e), format!("t{}", e));
                    }
                    row
                })
                .collect();
            match infer(&rows, None) {
                Some(ChartSpec::Pie { label_column, value_column, .. })
                | Some(ChartSpec::Bar { label_column, value_column, .. }) => {
                    prop_assert_eq!(label_column, "label");
                    prop_assert_eq!(value_column, "value");
                }
                other => prop_assert!(false, "expected category chart, got {:?}", other),
            }
        }
    }
}
