// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::{CsvError, Result};

/// Typed value of one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    /// The row had no cell for this column
    Absent,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

/// Formats the value the way it is written back to CSV: absent values are
/// empty and integral numbers have no decimal point.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Number(number) => write!(f, "{number}"),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Absent => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

/// How the text of a cell becomes a [`Value`].
#[derive(Clone)]
pub enum Coercion {
    Text,
    /// Trimmed text parsed as `f64`. Blank text is `0.0` and anything
    /// unparsable is `NaN`, so coercion never fails a row.
    Number,
    /// Case-insensitive comparison against the truthy literal
    Boolean { truthy: String },
    Custom(Arc<dyn Fn(&str) -> Value + Send + Sync>),
}

impl Coercion {
    /// Boolean coercion with `"true"` as the truthy literal.
    pub fn boolean() -> Self {
        Coercion::Boolean {
            truthy: "true".to_owned(),
        }
    }

    pub fn custom(f: impl Fn(&str) -> Value + Send + Sync + 'static) -> Self {
        Coercion::Custom(Arc::new(f))
    }

    pub fn apply(&self, text: &str) -> Value {
        match self {
            Coercion::Text => Value::Text(text.to_owned()),
            Coercion::Number => Value::Number(parse_number(text)),
            Coercion::Boolean { truthy } => Value::Bool(text.eq_ignore_ascii_case(truthy)),
            Coercion::Custom(f) => f(text),
        }
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coercion::Text => f.write_str("Text"),
            Coercion::Number => f.write_str("Number"),
            Coercion::Boolean { truthy } => f.debug_struct("Boolean").field("truthy", truthy).finish(),
            Coercion::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Ordered mapping from column name to coercion.
///
/// ```rust
/// use csvstream::{Coercion, Shape};
///
/// let shape = Shape::new()
///     .column("name", Coercion::Text)
///     .column("age", Coercion::Number);
/// assert_eq!(shape.keys().collect::<Vec<_>>(), ["name", "age"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Shape {
    columns: Vec<(String, Coercion)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, or replace the coercion of an existing one.
    pub fn column(mut self, name: impl Into<String>, coercion: Coercion) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = coercion,
            None => self.columns.push((name, coercion)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Coercion> {
        self.columns
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, coercion)| coercion)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Coercion)> for Shape {
    fn from_iter<I: IntoIterator<Item = (K, Coercion)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Shape::new(), |shape, (key, coercion)| shape.column(key, coercion))
    }
}

/// A row projected onto column names, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Set a field, keeping its position if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Function applied to every record after per-field coercion.
pub type RecordTransform = Arc<dyn Fn(Record) -> Record + Send + Sync>;

/// Maps the cells of a row onto a [`Record`].
#[derive(Clone, Default)]
pub struct RecordLayout {
    headers: Vec<String>,
    shape: Option<Shape>,
    include_extra_cells: bool,
    strict_columns: bool,
    transform: Option<RecordTransform>,
}

impl RecordLayout {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, shape: Option<Shape>) -> Self {
        self.shape = shape;
        self
    }

    pub fn include_extra_cells(mut self, include: bool) -> Self {
        self.include_extra_cells = include;
        self
    }

    pub fn strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    pub fn with_transform(mut self, transform: Option<RecordTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub(crate) fn set_headers(&mut self, headers: Vec<String>) {
        debug!("resolved {} headers", headers.len());
        self.headers = headers;
    }

    /// Zip `cells` positionally against the headers.
    ///
    /// A header named twice yields one field holding the later cell.
    ///
    /// `row` is the 1-based index reported by column-count errors.
    pub fn project(&self, cells: Vec<String>, row: Option<usize>) -> Result<Record> {
        let width = self.headers.len();
        if self.strict_columns {
            // Kept extras are never an error
            if cells.len() > width && !self.include_extra_cells {
                return Err(CsvError::TooManyColumns { row });
            }
            if cells.len() < width {
                return Err(CsvError::TooFewColumns { row });
            }
        }

        // A repeated header keeps its first position and its last value
        let mut record = Record {
            fields: Vec::with_capacity(width.max(cells.len())),
        };
        let mut cells = cells.into_iter();
        for header in &self.headers {
            let value = match cells.next() {
                Some(text) => self.coerce(header, text),
                None => Value::Absent,
            };
            record.insert(header.as_str(), value);
        }
        if self.include_extra_cells {
            for (n, text) in cells.enumerate() {
                record.insert(format!("extra_cell_{}", n + 1), Value::Text(text));
            }
        }

        Ok(match &self.transform {
            Some(transform) => transform(record),
            None => record,
        })
    }

    fn coerce(&self, header: &str, text: String) -> Value {
        match self.shape.as_ref().and_then(|shape| shape.get(header)) {
            Some(coercion) => coercion.apply(&text),
            None => Value::Text(text),
        }
    }
}

impl fmt::Debug for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLayout")
            .field("headers", &self.headers)
            .field("shape", &self.shape)
            .field("include_extra_cells", &self.include_extra_cells)
            .field("strict_columns", &self.strict_columns)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn layout() -> RecordLayout {
        RecordLayout::new(cells(&["name", "age", "city"]))
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Coercion::Number.apply(" 30 "), Value::Number(30.0));
        assert_eq!(Coercion::Number.apply("-1.5e2"), Value::Number(-150.0));
    }

    #[test]
    fn test_number_coercion_never_fails() {
        assert_eq!(Coercion::Number.apply(""), Value::Number(0.0));
        assert_eq!(Coercion::Number.apply(" \t "), Value::Number(0.0));
        let malformed = Coercion::Number.apply("thirty");
        assert!(malformed.as_f64().is_some_and(f64::is_nan));
    }

    #[test]
    fn test_boolean_coercion_is_case_insensitive() {
        assert_eq!(Coercion::boolean().apply("True"), Value::Bool(true));
        assert_eq!(Coercion::boolean().apply("yes"), Value::Bool(false));

        let yes = Coercion::Boolean {
            truthy: "Y".to_owned(),
        };
        assert_eq!(yes.apply("y"), Value::Bool(true));
        assert_eq!(yes.apply("true"), Value::Bool(false));
    }

    #[test]
    fn test_custom_coercion() {
        let shout = Coercion::custom(|text| Value::Text(text.to_uppercase()));
        assert_eq!(shout.apply("hi"), Value::from("HI"));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(30.0).to_string(), "30");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Absent.to_string(), "");
    }

    #[test]
    fn test_project_exact_row() {
        let record = layout()
            .project(cells(&["Alice", "30", "Paris"]), Some(2))
            .unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), ["name", "age", "city"]);
        assert_eq!(record.get("age"), Some(&Value::from("30")));
    }

    #[test]
    fn test_project_lenient_columns() {
        let record = layout().project(cells(&["Alice"]), Some(2)).unwrap();
        assert_eq!(record.get("age"), Some(&Value::Absent));
        assert_eq!(record.len(), 3);

        let record = layout()
            .project(cells(&["a", "b", "c", "d", "e"]), Some(2))
            .unwrap();
        assert_eq!(record.len(), 3);

        let record = layout()
            .include_extra_cells(true)
            .project(cells(&["a", "b", "c", "d", "e"]), Some(2))
            .unwrap();
        assert_eq!(record.get("extra_cell_1"), Some(&Value::from("d")));
        assert_eq!(record.get("extra_cell_2"), Some(&Value::from("e")));
    }

    #[test]
    fn test_project_strict_columns() {
        let strict = layout().strict_columns(true);
        assert!(matches!(
            strict.project(cells(&["a", "b", "c", "d"]), Some(2)),
            Err(CsvError::TooManyColumns { row: Some(2) })
        ));
        assert!(matches!(
            strict.project(cells(&["a", "b"]), Some(2)),
            Err(CsvError::TooFewColumns { row: Some(2) })
        ));
    }

    #[test]
    fn test_strict_columns_keep_extra_cells_when_included() {
        let layout = RecordLayout::new(cells(&["a"]))
            .strict_columns(true)
            .include_extra_cells(true);
        let record = layout.project(cells(&["1", "2"]), Some(2)).unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "extra_cell_1"]);
        assert!(matches!(
            layout.project(Vec::new(), Some(3)),
            Err(CsvError::TooFewColumns { row: Some(3) })
        ));
    }

    #[test]
    fn test_repeated_header_keeps_last_value() {
        let record = RecordLayout::new(cells(&["x", "y", "x"]))
            .project(cells(&["1", "2", "3"]), None)
            .unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["x", "y"]);
        assert_eq!(record.get("x"), Some(&Value::from("3")));
    }

    #[test]
    fn test_coercion_runs_before_transform() {
        let shape = Shape::new().column("age", Coercion::Number);
        let transform: RecordTransform = Arc::new(|mut record: Record| {
            let doubled = record.get("age").and_then(Value::as_f64).map(|age| age * 2.0);
            if let Some(doubled) = doubled {
                record.insert("age", doubled);
            }
            record
        });
        let record = layout()
            .with_shape(Some(shape))
            .with_transform(Some(transform))
            .project(cells(&["Bob", "21"]), None)
            .unwrap();
        assert_eq!(record.get("age"), Some(&Value::Number(42.0)));
        // Absent fields are not coerced
        assert_eq!(record.get("city"), Some(&Value::Absent));
    }

    #[test]
    fn test_record_insert_keeps_order() {
        let mut record: Record = [("a", "1"), ("b", "2")].into_iter().collect();
        record.insert("a", Value::Bool(true));
        record.insert("c", 3.0);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(record.remove("b"), Some(Value::from("2")));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_shape_from_iter_and_replace() {
        let shape: Shape = [("x", Coercion::Text), ("y", Coercion::Number)]
            .into_iter()
            .collect();
        let shape = shape.column("x", Coercion::boolean());
        assert_eq!(shape.len(), 2);
        assert!(matches!(shape.get("x"), Some(Coercion::Boolean { .. })));
    }
}
