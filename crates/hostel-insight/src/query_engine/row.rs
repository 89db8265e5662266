//! Ordered result rows.
//!
//! A `Row` keeps its cells in column order. JSON output is an object whose keys
//! appear in that same order, so charts and tables never reshuffle columns.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single database value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    /// Numeric view of a cell. Integers and finite reals pass through; text is
    /// trimmed and parsed as a float. Null, blank and non-numeric text give `None`.
    pub fn try_parse_numeric(&self) -> Option<f64> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Real(f) if f.is_finite() => Some(*f),
            CellValue::Real(_) => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    /// Label text for charts and previews. Null renders as an empty string.
    pub fn to_label(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Real(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Real(f) if f.is_finite() => serializer.serialize_f64(*f),
            CellValue::Real(_) => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct CellValueVisitor;

impl<'de> Visitor<'de> for CellValueVisitor {
    type Value = CellValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar cell value (null, number, string or boolean)")
    }

    fn visit_unit<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<CellValue, D::Error> {
        d.deserialize_any(CellValueVisitor)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CellValue, E> {
        Ok(CellValue::Integer(v as i64))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CellValue, E> {
        Ok(CellValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CellValue, E> {
        Ok(i64::try_from(v)
            .map(CellValue::Integer)
            .unwrap_or(CellValue::Real(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CellValue, E> {
        Ok(CellValue::Real(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CellValue, E> {
        Ok(CellValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CellValue, E> {
        Ok(CellValue::Text(v))
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellValueVisitor)
    }
}

/// One result row: `(column, value)` pairs in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { cells: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.push((column.into(), value.into()));
    }

    /// Builder form of [`Row::push`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn value_at(&self, idx: usize) -> Option<&CellValue> {
        self.cells.get(idx).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Self { cells: iter.into_iter().collect() }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping column names to scalar values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
        let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((column, value)) = access.next_entry::<String, CellValue>()? {
            row.cells.push((column, value));
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_parse_numeric_table() {
        assert_eq!(CellValue::Null.try_parse_numeric(), None);
        assert_eq!(CellValue::Integer(7).try_parse_numeric(), Some(7.0));
        assert_eq!(CellValue::Real(2.5).try_parse_numeric(), Some(2.5));
        assert_eq!(CellValue::Real(f64::NAN).try_parse_numeric(), None);
        assert_eq!(CellValue::from("   ").try_parse_numeric(), None);
        assert_eq!(CellValue::from(" 42 ").try_parse_numeric(), Some(42.0));
        assert_eq!(CellValue::from("-1.5e2").try_parse_numeric(), Some(-150.0));
        assert_eq!(CellValue::from("inf").try_parse_numeric(), None);
        assert_eq!(CellValue::from("Block A").try_parse_numeric(), None);
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = Row::new()
            .with("zeta", 1i64)
            .with("alpha", "x")
            .with("mid", CellValue::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":"x","mid":null}"#);
    }

    #[test]
    fn test_row_deserialize_keeps_document_order() {
        let row: Row = serde_json::from_str(r#"{"b": 2.5, "a": "text", "c": true}"#).unwrap();
        let cols: Vec<&str> = row.columns().collect();
        assert_eq!(cols, vec!["b", "a", "c"]);
        assert_eq!(row.get("b"), Some(&CellValue::Real(2.5)));
        assert_eq!(row.get("c"), Some(&CellValue::Integer(1)));
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let parsed: Result<Row, _> = serde_json::from_str(r#"{"a": [1, 2]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(CellValue::Null.to_label(), "");
        assert_eq!(CellValue::Integer(3).to_label(), "3");
        assert_eq!(CellValue::from("B").to_label(), "B");
    }
}
