use std::time::Instant;

use crate::debug::DebugLogger;
use crate::fit::{FontSizeRange, fit_text};
use crate::font::{FontFace, encode_winansi_pdf_string};
use crate::layout::{ColumnBox, Layout, TotalsRow};
use crate::metrics::PageMetrics;
use crate::overlay::{OverlayContent, PageOverlay};
use crate::paginate::{FieldSums, PageGroup, PageTotals};
use crate::types::{Band, PageBox, Pt};
use crate::units::{self, TimeCellStyle};

/// Whether totals cells that sum to zero are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroTotals {
    #[default]
    Suppress,
    Render,
}

#[derive(Debug, Clone)]
pub(crate) struct RenderSettings {
    pub cell_sizes: FontSizeRange,
    pub totals_sizes: FontSizeRange,
    pub cell_padding: f32,
    pub zero_totals: ZeroTotals,
    pub time_cells: TimeCellStyle,
    pub first_page_number: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            cell_sizes: FontSizeRange::default(),
            totals_sizes: FontSizeRange::default(),
            cell_padding: 2.0,
            zero_totals: ZeroTotals::Suppress,
            time_cells: TimeCellStyle::AsEntered,
            first_page_number: 1,
        }
    }
}

pub(crate) struct RenderedPage {
    pub content: OverlayContent,
    pub metrics: PageMetrics,
}

/// Where a cell sits, for diagnostics.
#[derive(Clone, Copy)]
struct CellRef<'a> {
    page: usize,
    row: Option<usize>,
    field: &'a str,
}

pub(crate) struct PageRenderer<'a> {
    pub layout: &'a Layout,
    pub font: &'a FontFace,
    pub page_box: PageBox,
    pub settings: &'a RenderSettings,
    pub debug: Option<&'a DebugLogger>,
}

impl PageRenderer<'_> {
    pub fn render_page(&self, group: &PageGroup<'_>, totals: &PageTotals) -> RenderedPage {
        let start = Instant::now();
        let page_number = group.index + 1;
        let mut overlay = PageOverlay::new();
        let mut metrics = PageMetrics {
            page_number,
            record_count: group.len(),
            ..PageMetrics::default()
        };

        for (row, record) in group.records.iter().enumerate() {
            let band = self.layout.row_band(row);
            for column in self.layout.usable_columns() {
                let text = units::format_cell(&column.field, record.get(&column.field), self.settings.time_cells);
                let cell = CellRef {
                    page: page_number,
                    row: Some(group.start + row),
                    field: &column.field,
                };
                self.draw_cell(&mut overlay, &mut metrics, column, band, &text, self.settings.cell_sizes, cell);
            }
        }

        for row in TotalsRow::ALL {
            let Some(band) = self.layout.totals_band(row) else {
                continue;
            };
            let sums = match row {
                TotalsRow::ThisPage => &totals.this_page,
                TotalsRow::CarriedForward => &totals.carried_forward,
                TotalsRow::Running => &totals.running,
            };
            self.draw_totals_row(&mut overlay, &mut metrics, band, sums, page_number);
        }

        if let Some(number_box) = self.layout.page_number() {
            let text = (self.settings.first_page_number + group.index).to_string();
            let cell = CellRef {
                page: page_number,
                row: None,
                field: "page_number",
            };
            self.draw_cell(
                &mut overlay,
                &mut metrics,
                &number_box.column(),
                number_box.band(),
                &text,
                self.settings.cell_sizes,
                cell,
            );
        }

        let content = overlay.to_content();
        metrics.content_bytes = content.bytes.len();
        metrics.render_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Some(debug) = self.debug {
            debug.page_rendered(page_number, group.len(), metrics.cells_drawn, metrics.content_bytes);
        }
        RenderedPage { content, metrics }
    }

    fn draw_totals_row(
        &self,
        overlay: &mut PageOverlay,
        metrics: &mut PageMetrics,
        band: Band,
        sums: &FieldSums,
        page_number: usize,
    ) {
        for column in self.layout.usable_columns() {
            let kind = logbook_contract::field_kind(&column.field);
            if !kind.is_aggregate() {
                continue;
            }
            let amount = sums.get(&column.field);
            if amount == 0 && self.settings.zero_totals == ZeroTotals::Suppress {
                continue;
            }
            let Some(text) = units::format_total(kind, amount) else {
                continue;
            };
            let cell = CellRef {
                page: page_number,
                row: None,
                field: &column.field,
            };
            self.draw_cell(overlay, metrics, column, band, &text, self.settings.totals_sizes, cell);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_cell(
        &self,
        overlay: &mut PageOverlay,
        metrics: &mut PageMetrics,
        column: &ColumnBox,
        band: Band,
        text: &str,
        sizes: FontSizeRange,
        cell: CellRef<'_>,
    ) {
        if text.trim().is_empty() {
            return;
        }
        let padding = Pt::from_f32(self.settings.cell_padding) * 2;
        let max_width = (Pt::from_f32(column.width()) - padding).max(Pt::ZERO);
        let fitted = fit_text(text, max_width, self.font, sizes);
        if fitted.truncated {
            if fitted.is_empty() {
                metrics.cells_dropped += 1;
                if let Some(debug) = self.debug {
                    debug.cell_dropped(cell.page, cell.row, cell.field, text);
                }
            } else {
                metrics.cells_truncated += 1;
                if let Some(debug) = self.debug {
                    debug.cell_truncated(cell.page, cell.row, cell.field, text, &fitted.text);
                }
            }
        }
        if fitted.is_empty() {
            return;
        }

        let size = Pt::from_i32(fitted.font_size as i32);
        let width = self.font.measure_text_width(size, &fitted.text);
        let x = self.page_box.x_to_pdf(column.center_x()) - width.half();
        let baseline = self.page_box.y_to_pdf(band.center()) - size.mul_ratio(35, 100);

        if let Some(debug) = self.debug {
            let replaced = encode_winansi_pdf_string(&fitted.text).replaced;
            if replaced > 0 {
                debug.winansi_lossy(cell.page, cell.field, &fitted.text, replaced);
            }
        }
        overlay.set_font_size(fitted.font_size);
        overlay.draw_string(x, baseline, fitted.text);
        metrics.cells_drawn += 1;
    }
}
