use std::collections::BTreeMap;

use logbook_contract::{FieldKind, LOGBOOK_FIELDS_V1};

use crate::units;

/// One raw logbook cell as handed over by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    #[default]
    Missing,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Number(v) => v.is_nan(),
            CellValue::Text(s) => units::is_blank_text(s),
            CellValue::Bool(_) => false,
        }
    }

    /// Numbers are decimal hours; text goes through [`units::parse_time`].
    pub fn minutes(&self) -> i64 {
        match self {
            CellValue::Missing | CellValue::Bool(_) => 0,
            CellValue::Number(hours) => units::hours_to_minutes(*hours),
            CellValue::Text(s) => units::parse_time(s),
        }
    }

    pub fn count(&self) -> i64 {
        match self {
            CellValue::Missing => 0,
            CellValue::Bool(b) => i64::from(*b),
            CellValue::Number(v) => units::round_count(*v),
            CellValue::Text(s) => units::parse_count(s),
        }
    }

    /// Value of this cell in the unit of an aggregate field kind.
    pub fn aggregate(&self, kind: FieldKind) -> i64 {
        match kind {
            FieldKind::Time => self.minutes(),
            FieldKind::Count => self.count(),
            FieldKind::Date | FieldKind::Text => 0,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// A logbook row: field name to raw value. Absent fields read as [`CellValue::Missing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    cells: BTreeMap<String, CellValue>,
}

static MISSING: CellValue = CellValue::Missing;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> &CellValue {
        self.cells.get(field).unwrap_or(&MISSING)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Builds a record from cells listed in logbook column order; extra cells are ignored.
    pub fn from_ordered_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut record = Record::new();
        for (def, cell) in LOGBOOK_FIELDS_V1.iter().zip(cells) {
            record.set(def.name, CellValue::Text(cell.into()));
        }
        record
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}
