//! Page geometry of the logbook grid.
//!
//! Coordinates are points with the origin at the top-left corner of the page, as measured on the
//! printed form. [`Layout`] is immutable once built; every source (the embedded default, a JSON
//! descriptor, or the widgets of a fillable template) goes through [`LayoutBuilder`].

use serde_json::Value;

use crate::error::LogbookError;
use crate::types::{Band, Pt};

/// Boxes at most this wide are legacy or disabled columns and are never drawn.
pub const MIN_COLUMN_WIDTH: f32 = 0.5;

pub const DEFAULT_ROWS_PER_PAGE: usize = 14;
/// Upper bound on record rows per page; keeps row arithmetic inside `i32`.
pub const MAX_ROWS_PER_PAGE: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBox {
    pub field: String,
    pub x_left: f32,
    pub x_right: f32,
}

impl ColumnBox {
    pub fn new(field: impl Into<String>, x_left: f32, x_right: f32) -> Self {
        Self {
            field: field.into(),
            x_left,
            x_right,
        }
    }

    pub fn width(&self) -> f32 {
        self.x_right - self.x_left
    }

    pub fn is_usable(&self) -> bool {
        self.width() > MIN_COLUMN_WIDTH
    }

    pub fn center_x(&self) -> Pt {
        let left = Pt::from_f32(self.x_left);
        left + (Pt::from_f32(self.x_right) - left).half()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TotalsRow {
    /// Sum of the records on this page.
    ThisPage,
    /// Sum of every earlier page.
    CarriedForward,
    /// Carried forward plus this page.
    Running,
}

impl TotalsRow {
    pub const ALL: [TotalsRow; 3] = [TotalsRow::ThisPage, TotalsRow::CarriedForward, TotalsRow::Running];

    pub fn key(self) -> &'static str {
        match self {
            TotalsRow::ThisPage => "this_page",
            TotalsRow::CarriedForward => "carried_forward",
            TotalsRow::Running => "running",
        }
    }

    fn index(self) -> usize {
        match self {
            TotalsRow::ThisPage => 0,
            TotalsRow::CarriedForward => 1,
            TotalsRow::Running => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageNumberBox {
    pub x_left: f32,
    pub x_right: f32,
    pub y_top: f32,
    pub y_bottom: f32,
}

impl PageNumberBox {
    pub fn column(&self) -> ColumnBox {
        ColumnBox::new("page_number", self.x_left, self.x_right)
    }

    pub fn band(&self) -> Band {
        Band::new(self.y_top, self.y_bottom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    layout_id: String,
    y_top: f32,
    y_bottom: f32,
    columns: Vec<ColumnBox>,
    rows_per_page: usize,
    totals: [Option<(f32, f32)>; 3],
    page_number: Option<PageNumberBox>,
}

impl Layout {
    pub fn builder(y_top: f32, y_bottom: f32) -> LayoutBuilder {
        LayoutBuilder::new(y_top, y_bottom)
    }

    /// The blank Spanish logbook the renderer ships with.
    pub fn default_logbook() -> Result<Self, LogbookError> {
        Self::from_json_str(logbook_contract::default_layout_v1_json())
    }

    pub fn from_json_str(json: &str) -> Result<Self, LogbookError> {
        let root: Value = serde_json::from_str(json)
            .map_err(|err| invalid(format!("layout JSON: {err}")))?;
        Self::from_json_value(&root)
    }

    pub fn from_json_value(root: &Value) -> Result<Self, LogbookError> {
        let grid = root
            .get("grid")
            .ok_or_else(|| invalid("layout: missing grid"))?;
        let y_top = number(grid, "y_top", "grid")?;
        let y_bottom = number(grid, "y_bottom", "grid")?;
        let mut builder = LayoutBuilder::new(y_top, y_bottom);

        if let Some(id) = root.get("layout_id") {
            let id = id
                .as_str()
                .ok_or_else(|| invalid("layout: layout_id must be a string"))?;
            builder = builder.layout_id(id);
        }
        if let Some(rows) = root.get("rows_per_page") {
            let rows = rows
                .as_u64()
                .ok_or_else(|| invalid("layout: rows_per_page must be a positive integer"))?;
            builder = builder.rows_per_page(usize::try_from(rows).unwrap_or(usize::MAX));
        }

        let columns = root
            .get("columns")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("layout: columns must be an array"))?;
        for (idx, column) in columns.iter().enumerate() {
            let context = format!("columns[{idx}]");
            let field = column
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(format!("layout: {context}.field must be a string")))?;
            let x_left = number(column, "x_left", &context)?;
            let x_right = number(column, "x_right", &context)?;
            builder = builder.column(field, x_left, x_right);
        }

        if let Some(totals) = root.get("totals") {
            if !totals.is_object() {
                return Err(invalid("layout: totals must be an object"));
            }
            for row in TotalsRow::ALL {
                let Some(pair) = totals.get(row.key()) else {
                    continue;
                };
                if pair.is_null() {
                    continue;
                }
                let (top, bottom) = number_pair(pair, row.key())?;
                builder = builder.totals(row, top, bottom);
            }
        }

        if let Some(page_number) = root.get("page_number") {
            if !page_number.is_null() {
                builder = builder.page_number(PageNumberBox {
                    x_left: number(page_number, "x_left", "page_number")?,
                    x_right: number(page_number, "x_right", "page_number")?,
                    y_top: number(page_number, "y_top", "page_number")?,
                    y_bottom: number(page_number, "y_bottom", "page_number")?,
                });
            }
        }

        builder.build()
    }

    pub fn layout_id(&self) -> &str {
        &self.layout_id
    }

    pub fn y_top(&self) -> f32 {
        self.y_top
    }

    pub fn y_bottom(&self) -> f32 {
        self.y_bottom
    }

    pub fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    pub fn columns(&self) -> &[ColumnBox] {
        &self.columns
    }

    pub fn usable_columns(&self) -> impl Iterator<Item = &ColumnBox> {
        self.columns.iter().filter(|c| c.is_usable())
    }

    pub fn skipped_columns(&self) -> impl Iterator<Item = &ColumnBox> {
        self.columns.iter().filter(|c| !c.is_usable())
    }

    pub fn column(&self, field: &str) -> Option<&ColumnBox> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Vertical band of the `index`-th record row on a page.
    pub fn row_band(&self, index: usize) -> Band {
        let top = Pt::from_f32(self.y_top);
        let height = Pt::from_f32(self.y_bottom) - top;
        let rows = i32::try_from(self.rows_per_page.clamp(1, MAX_ROWS_PER_PAGE)).unwrap_or(1);
        let index = i32::try_from(index.min(MAX_ROWS_PER_PAGE)).unwrap_or(rows);
        Band {
            top: top + height.mul_ratio(index, rows),
            bottom: top + height.mul_ratio(index + 1, rows),
        }
    }

    pub fn totals_band(&self, row: TotalsRow) -> Option<Band> {
        self.totals[row.index()].map(|(top, bottom)| Band::new(top, bottom))
    }

    pub fn page_number(&self) -> Option<&PageNumberBox> {
        self.page_number.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    layout_id: String,
    y_top: f32,
    y_bottom: f32,
    columns: Vec<ColumnBox>,
    rows_per_page: usize,
    totals: [Option<(f32, f32)>; 3],
    page_number: Option<PageNumberBox>,
}

impl LayoutBuilder {
    pub fn new(y_top: f32, y_bottom: f32) -> Self {
        Self {
            layout_id: "custom".to_string(),
            y_top,
            y_bottom,
            columns: Vec::new(),
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            totals: [None; 3],
            page_number: None,
        }
    }

    pub fn layout_id(mut self, id: impl Into<String>) -> Self {
        self.layout_id = id.into();
        self
    }

    pub fn rows_per_page(mut self, rows: usize) -> Self {
        self.rows_per_page = rows;
        self
    }

    pub fn column(mut self, field: impl Into<String>, x_left: f32, x_right: f32) -> Self {
        self.columns.push(ColumnBox::new(field, x_left, x_right));
        self
    }

    pub fn totals(mut self, row: TotalsRow, y_top: f32, y_bottom: f32) -> Self {
        self.totals[row.index()] = Some((y_top, y_bottom));
        self
    }

    pub fn page_number(mut self, page_number: PageNumberBox) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn build(self) -> Result<Layout, LogbookError> {
        if self.rows_per_page == 0 {
            return Err(invalid("layout: rows_per_page must be at least 1"));
        }
        if self.rows_per_page > MAX_ROWS_PER_PAGE {
            return Err(invalid(format!(
                "layout: rows_per_page must be at most {MAX_ROWS_PER_PAGE} (got {})",
                self.rows_per_page
            )));
        }
        check_span(self.y_top, self.y_bottom, "grid")?;
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !column.x_left.is_finite() || !column.x_right.is_finite() {
                return Err(invalid(format!(
                    "layout: column {} has a non-finite span",
                    column.field
                )));
            }
            if !seen.insert(column.field.as_str()) {
                return Err(invalid(format!(
                    "layout: duplicate column {}",
                    column.field
                )));
            }
        }
        for row in TotalsRow::ALL {
            if let Some((top, bottom)) = self.totals[row.index()] {
                check_span(top, bottom, row.key())?;
            }
        }
        if let Some(b) = &self.page_number {
            check_span(b.y_top, b.y_bottom, "page_number")?;
            check_span(b.x_left, b.x_right, "page_number")?;
        }
        Ok(Layout {
            layout_id: self.layout_id,
            y_top: self.y_top,
            y_bottom: self.y_bottom,
            columns: self.columns,
            rows_per_page: self.rows_per_page,
            totals: self.totals,
            page_number: self.page_number,
        })
    }
}

fn invalid(message: impl Into<String>) -> LogbookError {
    LogbookError::InvalidConfiguration(message.into())
}

fn check_span(start: f32, end: f32, context: &str) -> Result<(), LogbookError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(invalid(format!("layout: {context} has non-finite bounds")));
    }
    if end <= start {
        return Err(invalid(format!(
            "layout: {context} ends at {end} before it starts at {start}"
        )));
    }
    Ok(())
}

fn number(obj: &Value, key: &str, context: &str) -> Result<f32, LogbookError> {
    obj.get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .ok_or_else(|| invalid(format!("layout: {context}.{key} must be a number")))
}

fn number_pair(value: &Value, context: &str) -> Result<(f32, f32), LogbookError> {
    let items = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| invalid(format!("layout: totals.{context} must be [top, bottom]")))?;
    let top = items[0].as_f64();
    let bottom = items[1].as_f64();
    match (top, bottom) {
        (Some(top), Some(bottom)) => Ok((top as f32, bottom as f32)),
        _ => Err(invalid(format!(
            "layout: totals.{context} must hold two numbers"
        ))),
    }
}
