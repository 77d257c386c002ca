//! # Domain Types for Tablesmith
//!
//! Scalar values, rows, spreadsheet grids, order line-items, and the outcome
//! types returned by each component.
//!
//! ## Values
//!
//! Cells and columns hold one of four scalars. The fixed family schemas only
//! declare `TEXT`, `REAL` and `INTEGER` columns, so [`Value`] mirrors SQLite's
//! storage classes minus `BLOB`.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// =============================================================================
// Value
// =============================================================================

/// A single scalar cell value.
///
/// # Rust Pattern: Untagged Serde Enum
///
/// `#[serde(untagged)]` makes `Value::Text("x")` serialize as `"x"` and
/// `Value::Real(1.5)` as `1.5`, so rows read back as plain JSON objects.
/// Variant order matters when deserializing: integers are tried before reals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as `f64` for any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Interprets a raw spreadsheet cell: empty is null, whole numbers become
    /// integers, other numbers reals, everything else stays text.
    ///
    /// Whole numbers stay integers so a `TEXT` column stores `"7"`, not `"7.0"`.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Integer(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Real(f),
            _ => Value::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) => Ok(Value::Real(f)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

// =============================================================================
// Row
// =============================================================================

/// An ordered mapping from column name to value.
///
/// Column order is kept as the store returned it (or as the caller built it),
/// and the row serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, replacing the value if the column already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Builder-style [`Row::insert`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (c, v) in iter {
            row.insert(c, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (c, v) in &self.columns {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((column, value)) = access.next_entry::<String, Value>()? {
                    row.insert(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// =============================================================================
// Spreadsheet Grid
// =============================================================================

/// A parsed spreadsheet: row 0 holds headers, rows 1..N hold data.
///
/// Produced once per upload, consumed by one ingestion, then discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpreadsheetGrid {
    rows: Vec<Vec<Value>>,
}

impl SpreadsheetGrid {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows }
    }

    /// Builds a grid from header names and data rows.
    pub fn from_parts(headers: &[&str], data: Vec<Vec<Value>>) -> Self {
        let mut rows = Vec::with_capacity(data.len() + 1);
        rows.push(headers.iter().map(|h| Value::from(*h)).collect());
        rows.extend(data);
        Self { rows }
    }

    /// Header names from row 0.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if the grid is empty or a header cell is not text.
    pub fn headers(&self) -> Result<Vec<String>> {
        let first = self
            .rows
            .first()
            .ok_or_else(|| Error::Validation("spreadsheet has no header row".to_string()))?;
        if first.is_empty() {
            return Err(Error::Validation("spreadsheet header row is empty".to_string()));
        }
        first
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Value::Text(s) => Ok(s.trim().to_string()),
                other => Err(Error::Validation(format!(
                    "header cell {i} is not text: {other}"
                ))),
            })
            .collect()
    }

    /// Data rows (everything after the header).
    pub fn data_rows(&self) -> &[Vec<Value>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Number of data rows.
    pub fn data_len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// One order line-item for a mesa.
///
/// Field names serialize the way the order tables name their columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub mesa: i64,
    pub producto: String,
    pub cantidad: i64,
    #[serde(rename = "precioUnitario")]
    pub precio_unitario: i64,
    pub entregado: String,
    pub pagado: String,
}

impl OrderLine {
    pub fn new(mesa: i64, producto: impl Into<String>, cantidad: i64, precio_unitario: i64) -> Self {
        Self {
            mesa,
            producto: producto.into(),
            cantidad,
            precio_unitario,
            entregado: "no".to_string(),
            pagado: "no".to_string(),
        }
    }
}

/// An ordered batch of line-items, all for the same mesa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBatch {
    #[serde(rename = "ordenes")]
    pub lines: Vec<OrderLine>,
}

impl OrderBatch {
    pub fn new(lines: Vec<OrderLine>) -> Self {
        Self { lines }
    }

    /// The mesa every line belongs to.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if the batch is empty or mixes mesas.
    pub fn mesa(&self) -> Result<i64> {
        let first = self
            .lines
            .first()
            .ok_or_else(|| Error::Validation("no orders provided".to_string()))?;
        if let Some(other) = self.lines.iter().find(|l| l.mesa != first.mesa) {
            return Err(Error::Validation(format!(
                "order batch mixes mesa {} and mesa {}",
                first.mesa, other.mesa
            )));
        }
        Ok(first.mesa)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// =============================================================================
// Back Office
// =============================================================================

/// A menu product. `estado` is `activo` for products customers may order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub nombre: String,
    pub precio: i64,
    pub categoria: String,
    pub estado: String,
}

impl Product {
    /// An active product.
    pub fn new(nombre: impl Into<String>, precio: i64, categoria: impl Into<String>) -> Self {
        Self {
            nombre: nombre.into(),
            precio,
            categoria: categoria.into(),
            estado: PRODUCT_ACTIVE.to_string(),
        }
    }
}

/// `estado` of products listed to customers.
pub const PRODUCT_ACTIVE: &str = "activo";

/// One settled bill. Amounts are whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub metodo_pago: i64,
    pub total_venta: i64,
    pub descuento_total: i64,
    pub propina: i64,
    pub monto_pagado: i64,
    pub cambio_devuelto: i64,
}

impl Payment {
    /// Values in `ventasHoy` column order.
    pub fn values(&self) -> [i64; 6] {
        [
            self.metodo_pago,
            self.total_venta,
            self.descuento_total,
            self.propina,
            self.monto_pagado,
            self.cambio_devuelto,
        ]
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of ensuring a family table exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

impl Provisioned {
    pub fn was_created(self) -> bool {
        self == Provisioned::Created
    }
}

/// Result of cloning a master table into a derived table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// The destination was created and filled with this many rows.
    Cloned { rows_copied: usize },
    /// The destination already existed; only the link was (re)recorded.
    AlreadyLinked,
}

/// Result of a bulk ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub table: String,
    pub provisioned: Provisioned,
    pub rows_deleted: usize,
    pub rows_written: usize,
}

/// Result of an order batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub mesa: i64,
    pub mirror_table: String,
    pub rows_written: usize,
}

// =============================================================================
// Tests
// =============================================================================
