//! Layout derived from the text widgets of a fillable logbook template.
//!
//! Widget names follow the form's own convention: `<FIELD>_<row>` for grid cells,
//! `TOTAL DE ESTA PÁGINA <FIELD>`, `TOTAL DESDE LAS PÁGINAS PREVIAS <FIELD>` and
//! `TIEMPO TOTAL <FIELD>` for the three totals rows, and `Número de página`.

use std::collections::BTreeMap;

use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};

use crate::error::LogbookError;
use crate::layout::{Layout, LayoutBuilder, PageNumberBox, TotalsRow};
use crate::template::{TemplatePdf, rect_from_object, resolve_array, resolve_dict};
use crate::types::PageBox;

const THIS_PAGE_PREFIX: &str = "TOTAL DE ESTA PÁGINA ";
const CARRIED_FORWARD_PREFIX: &str = "TOTAL DESDE LAS PÁGINAS PREVIAS ";
const RUNNING_PREFIX: &str = "TIEMPO TOTAL ";
const PAGE_NUMBER_NAME: &str = "NÚMERO DE PÁGINA";

/// A named widget rectangle converted to top-left page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormWidget {
    pub name: String,
    pub x_left: f32,
    pub x_right: f32,
    pub y_top: f32,
    pub y_bottom: f32,
}

#[derive(Debug, Clone, PartialEq)]
enum WidgetRole {
    Cell { field: &'static str, row: usize },
    Total { row: TotalsRow, field: &'static str },
    PageNumber,
}

fn classify(name: &str) -> Option<WidgetRole> {
    let name = name.trim();
    if let Some((field, row)) = name.rsplit_once('_') {
        if let (Some(def), Ok(row)) = (
            logbook_contract::field_def_case_insensitive(field),
            row.trim().parse::<usize>(),
        ) {
            return Some(WidgetRole::Cell {
                field: def.name,
                row,
            });
        }
    }
    let upper = name.to_uppercase();
    if upper == PAGE_NUMBER_NAME {
        return Some(WidgetRole::PageNumber);
    }
    for (prefix, row) in [
        (THIS_PAGE_PREFIX, TotalsRow::ThisPage),
        (CARRIED_FORWARD_PREFIX, TotalsRow::CarriedForward),
        (RUNNING_PREFIX, TotalsRow::Running),
    ] {
        if let Some(rest) = upper.strip_prefix(prefix) {
            let def = logbook_contract::field_def_case_insensitive(rest)?;
            return Some(WidgetRole::Total {
                row,
                field: def.name,
            });
        }
    }
    None
}

fn field_name(doc: &LoDocument, dict: &lopdf::Dictionary) -> Option<String> {
    let mut parts = Vec::new();
    let mut current = Some(dict);
    let mut depth = 0;
    while let Some(d) = current {
        if let Ok(t) = d.get(b"T") {
            if let Ok(text) = lopdf::decode_text_string(t) {
                parts.push(text);
            }
        }
        depth += 1;
        if depth > 16 {
            break;
        }
        current = d.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o));
    }
    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join("."))
}

/// Text widgets annotated on one page, in annotation order.
pub(crate) fn collect_widgets(doc: &LoDocument, page_id: LoObjectId, page_box: PageBox) -> Vec<FormWidget> {
    let Some(page) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return Vec::new();
    };
    let Some(annots) = page.get(b"Annots").ok().and_then(|o| resolve_array(doc, o)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for annot in annots {
        let Some(dict) = resolve_dict(doc, annot) else {
            continue;
        };
        let is_widget = dict
            .get(b"Subtype")
            .and_then(LoObject::as_name)
            .map(|n| n == b"Widget")
            .unwrap_or(false);
        if !is_widget {
            continue;
        }
        let Some(name) = field_name(doc, dict) else {
            continue;
        };
        let Some([x1, y1, x2, y2]) = dict.get(b"Rect").ok().and_then(|o| rect_from_object(doc, o)) else {
            continue;
        };
        out.push(FormWidget {
            name,
            x_left: x1 - page_box.llx,
            x_right: x2 - page_box.llx,
            y_top: page_box.ury - y2,
            y_bottom: page_box.ury - y1,
        });
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: f32,
    end: f32,
}

impl Span {
    fn union(self, start: f32, end: f32) -> Span {
        Span {
            start: self.start.min(start),
            end: self.end.max(end),
        }
    }
}

fn widen(slot: &mut Option<Span>, start: f32, end: f32) {
    *slot = Some(match slot {
        Some(span) => span.union(start, end),
        None => Span { start, end },
    });
}

pub(crate) fn layout_from_widgets(widgets: &[FormWidget]) -> Result<Layout, LogbookError> {
    let mut columns: BTreeMap<&'static str, Span> = BTreeMap::new();
    let mut grid: Option<Span> = None;
    let mut max_row = None::<usize>;
    let mut totals: [Option<Span>; 3] = [None; 3];
    let mut page_number: Option<&FormWidget> = None;

    for widget in widgets {
        match classify(&widget.name) {
            Some(WidgetRole::Cell { field, row }) => {
                let entry = columns.entry(field).or_insert(Span {
                    start: widget.x_left,
                    end: widget.x_right,
                });
                *entry = entry.union(widget.x_left, widget.x_right);
                widen(&mut grid, widget.y_top, widget.y_bottom);
                max_row = Some(max_row.map_or(row, |m| m.max(row)));
            }
            Some(WidgetRole::Total { row, .. }) => {
                let slot = match row {
                    TotalsRow::ThisPage => &mut totals[0],
                    TotalsRow::CarriedForward => &mut totals[1],
                    TotalsRow::Running => &mut totals[2],
                };
                widen(slot, widget.y_top, widget.y_bottom);
            }
            Some(WidgetRole::PageNumber) => {
                if page_number.is_none() {
                    page_number = Some(widget);
                }
            }
            None => {}
        }
    }

    let (Some(grid), Some(max_row)) = (grid, max_row) else {
        return Err(LogbookError::InvalidConfiguration(
            "form layout: template has no row widgets".to_string(),
        ));
    };

    let mut ordered: Vec<(&'static str, Span)> = columns.into_iter().collect();
    ordered.sort_by(|a, b| {
        a.1.start
            .partial_cmp(&b.1.start)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut builder = LayoutBuilder::new(grid.start, grid.end)
        .layout_id("acroform")
        .rows_per_page(max_row + 1);
    for (field, span) in ordered {
        builder = builder.column(field, span.start, span.end);
    }
    for (row, span) in TotalsRow::ALL.into_iter().zip(totals) {
        if let Some(span) = span {
            builder = builder.totals(row, span.start, span.end);
        }
    }
    if let Some(w) = page_number {
        builder = builder.page_number(PageNumberBox {
            x_left: w.x_left,
            x_right: w.x_right,
            y_top: w.y_top,
            y_bottom: w.y_bottom,
        });
    }
    builder.build()
}

/// Derives the grid, totals rows and page-number box from the first template page's widgets.
///
/// Output pages are copies of the first template page, so a form that spreads logbook widgets
/// over later pages is rejected rather than losing those columns.
pub fn layout_from_form_fields(template: &TemplatePdf) -> Result<Layout, LogbookError> {
    let doc = template.document();
    for (page_number, page_id) in doc.get_pages() {
        if page_id == template.first_page_id() {
            continue;
        }
        let stray = collect_widgets(doc, page_id, template.page_box())
            .into_iter()
            .find(|w| classify(&w.name).is_some());
        if let Some(widget) = stray {
            return Err(LogbookError::InvalidConfiguration(format!(
                "form layout: widget {:?} sits on template page {page_number}; only single-page forms are supported",
                widget.name
            )));
        }
    }
    let widgets = collect_widgets(doc, template.first_page_id(), template.page_box());
    layout_from_widgets(&widgets)
}
