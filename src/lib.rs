mod compose;
mod debug;
mod error;
mod fit;
mod font;
mod form_layout;
mod layout;
mod metrics;
mod overlay;
mod paginate;
mod perf;
mod record;
mod render;
mod template;
mod types;
mod units;

use debug::DebugLogger;
pub use error::LogbookError;
pub use fit::{ELLIPSIS, FittedText, FontSizeRange, fit_text};
pub use font::FontFace;
pub use form_layout::layout_from_form_fields;
pub use layout::{
    ColumnBox, DEFAULT_ROWS_PER_PAGE, Layout, LayoutBuilder, MAX_ROWS_PER_PAGE, MIN_COLUMN_WIDTH, PageNumberBox,
    TotalsRow,
};
pub use logbook_contract::{FieldDef, FieldKind, LOGBOOK_FIELDS_V1};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use overlay::{Command, OverlayContent, PageOverlay};
pub use paginate::{FieldSums, PageGroup, PageTotals, aggregate, page_totals, paginate, running};
use perf::{PerfLogger, Stage};
use rayon::prelude::*;
pub use record::{CellValue, Record};
use render::{PageRenderer, RenderSettings, RenderedPage};
pub use render::ZeroTotals;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
pub use template::TemplatePdf;
pub use types::{Band, PageBox, Pt};
pub use units::{
    TimeCellStyle, format_cell, format_display, format_minutes, format_total, parse_count,
    parse_time,
};

/// Fills a blank logbook template with flight records.
///
/// The template, layout and font are resolved once by [`LogbookRendererBuilder::build`]; every
/// call to [`LogbookRenderer::render`] recomputes pagination and totals from scratch.
///
/// Every output page is a copy of the first template page's drawing plus its non-widget
/// annotations. Form fields and the AcroForm are not carried over, so rendering zero records
/// yields the template page without its fillable fields.
pub struct LogbookRenderer {
    template: Arc<TemplatePdf>,
    layout: Layout,
    font: Arc<FontFace>,
    settings: RenderSettings,
    parallel: bool,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
}

enum TemplateSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

enum LayoutSource {
    Default,
    Explicit(Layout),
    Json(String),
    FormFields,
}

enum FontSource {
    Helvetica,
    Path(PathBuf),
    Bytes(Vec<u8>, Option<String>),
}

pub struct LogbookRendererBuilder {
    template: Option<TemplateSource>,
    layout: LayoutSource,
    font: FontSource,
    settings: RenderSettings,
    parallel: bool,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl LogbookRenderer {
    pub fn builder() -> LogbookRendererBuilder {
        LogbookRendererBuilder::new()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn template(&self) -> &TemplatePdf {
        &self.template
    }

    pub fn font(&self) -> &FontFace {
        &self.font
    }

    pub fn render(&self, records: &[Record]) -> Result<Vec<u8>, LogbookError> {
        self.render_with_metrics(records).map(|(bytes, _)| bytes)
    }

    pub fn render_with_metrics(&self, records: &[Record]) -> Result<(Vec<u8>, DocumentMetrics), LogbookError> {
        let start = Instant::now();
        let perf = self.perf.as_ref();
        let groups = perf::timed(perf, Stage::Paginate, || {
            paginate(records, self.layout.rows_per_page())
        });
        let fields: Vec<FieldDef> = logbook_contract::aggregate_fields_v1().copied().collect();
        let totals = perf::timed(perf, Stage::Aggregate, || {
            page_totals(&groups, &fields, self.parallel)
        });

        let renderer = PageRenderer {
            layout: &self.layout,
            font: &self.font,
            page_box: self.template.page_box(),
            settings: &self.settings,
            debug: self.debug.as_ref(),
        };
        let pages: Vec<RenderedPage> = perf::timed(perf, Stage::Overlay, || {
            if self.parallel {
                groups
                    .par_iter()
                    .zip(totals.par_iter())
                    .map(|(group, totals)| renderer.render_page(group, totals))
                    .collect()
            } else {
                groups
                    .iter()
                    .zip(totals.iter())
                    .map(|(group, totals)| renderer.render_page(group, totals))
                    .collect()
            }
        });

        let mut page_metrics = Vec::with_capacity(pages.len());
        let mut overlays = Vec::with_capacity(pages.len());
        for page in pages {
            if let Some(perf) = perf {
                perf.log_page(&page.metrics, page.content.replaced);
            }
            overlays.push(page.content.bytes);
            page_metrics.push(page.metrics);
        }

        let bytes = perf::timed(perf, Stage::Compose, || {
            compose::compose_document(&self.template, &self.font, &overlays)
        })?;
        let metrics = DocumentMetrics {
            pages: page_metrics,
            total_render_ms: start.elapsed().as_secs_f64() * 1000.0,
            total_bytes: bytes.len(),
        };
        self.emit_debug_summary("render");
        Ok((bytes, metrics))
    }

    pub fn render_to_file(&self, records: &[Record], path: impl AsRef<Path>) -> Result<DocumentMetrics, LogbookError> {
        let (bytes, metrics) = self.render_with_metrics(records)?;
        std::fs::write(path, bytes)?;
        Ok(metrics)
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_ref() {
            perf.flush();
        }
    }
}

impl Default for LogbookRendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogbookRendererBuilder {
    pub fn new() -> Self {
        Self {
            template: None,
            layout: LayoutSource::Default,
            font: FontSource::Helvetica,
            settings: RenderSettings::default(),
            parallel: false,
            debug_path: None,
            perf_path: None,
        }
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(TemplateSource::Path(path.into()));
        self
    }

    pub fn template_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.template = Some(TemplateSource::Bytes(bytes.into()));
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = LayoutSource::Explicit(layout);
        self
    }

    /// JSON layout descriptor, parsed when the renderer is built.
    pub fn layout_json(mut self, json: impl Into<String>) -> Self {
        self.layout = LayoutSource::Json(json.into());
        self
    }

    // Geometry comes from the template's own AcroForm widgets.
    pub fn layout_from_form_fields(mut self, enabled: bool) -> Self {
        if enabled {
            self.layout = LayoutSource::FormFields;
        } else if matches!(self.layout, LayoutSource::FormFields) {
            self.layout = LayoutSource::Default;
        }
        self
    }

    pub fn font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font = FontSource::Path(path.into());
        self
    }

    pub fn font_bytes(mut self, data: Vec<u8>, name: Option<&str>) -> Self {
        self.font = FontSource::Bytes(data, name.map(str::to_string));
        self
    }

    pub fn font_sizes(mut self, max: u16, min: u16) -> Self {
        self.settings.cell_sizes = FontSizeRange::new(max, min);
        self
    }

    pub fn totals_font_sizes(mut self, max: u16, min: u16) -> Self {
        self.settings.totals_sizes = FontSizeRange::new(max, min);
        self
    }

    pub fn cell_padding(mut self, padding: f32) -> Self {
        self.settings.cell_padding = padding;
        self
    }

    pub fn zero_totals(mut self, mode: ZeroTotals) -> Self {
        self.settings.zero_totals = mode;
        self
    }

    pub fn normalize_time_cells(mut self, enabled: bool) -> Self {
        self.settings.time_cells = if enabled {
            TimeCellStyle::Normalized
        } else {
            TimeCellStyle::AsEntered
        };
        self
    }

    pub fn first_page_number(mut self, number: usize) -> Self {
        self.settings.first_page_number = number;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<LogbookRenderer, LogbookError> {
        validate_settings(&self.settings)?;
        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = match &self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };

        let template = match self.template {
            Some(TemplateSource::Path(path)) => TemplatePdf::from_path(path)?,
            Some(TemplateSource::Bytes(bytes)) => TemplatePdf::from_bytes(bytes)?,
            None => return Err(LogbookError::MissingTemplate),
        };
        if let Some(logger) = debug.as_ref() {
            let page_box = template.page_box();
            logger.template_loaded(
                template.sha256(),
                template.page_count(),
                page_box.width(),
                page_box.height(),
            );
        }

        let layout = match self.layout {
            LayoutSource::Default => Layout::default_logbook()?,
            LayoutSource::Explicit(layout) => layout,
            LayoutSource::Json(json) => Layout::from_json_str(&json)?,
            LayoutSource::FormFields => layout_from_form_fields(&template)?,
        };
        if let Some(logger) = debug.as_ref() {
            for column in layout.skipped_columns() {
                logger.column_skipped(&column.field, column.width());
            }
        }

        let font = match self.font {
            FontSource::Helvetica => FontFace::helvetica(),
            FontSource::Path(path) => FontFace::from_file(path)?,
            FontSource::Bytes(data, name) => FontFace::from_bytes(data, name.as_deref())?,
        };

        Ok(LogbookRenderer {
            template: Arc::new(template),
            layout,
            font: Arc::new(font),
            settings: self.settings,
            parallel: self.parallel,
            debug,
            perf,
        })
    }
}

fn validate_settings(settings: &RenderSettings) -> Result<(), LogbookError> {
    for (name, range) in [
        ("font_sizes", settings.cell_sizes),
        ("totals_font_sizes", settings.totals_sizes),
    ] {
        if range.max == 0 || range.min == 0 {
            return Err(LogbookError::InvalidConfiguration(format!(
                "{name} must be at least 1pt (got max={} min={})",
                range.max, range.min
            )));
        }
    }
    if !settings.cell_padding.is_finite() || settings.cell_padding < 0.0 {
        return Err(LogbookError::InvalidConfiguration(format!(
            "cell_padding must be a non-negative number (got {})",
            settings.cell_padding
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::overlay_content;
    use crate::template::fixtures::{blank_template_bytes, temp_path, template_pdf_bytes};
    use lopdf::Document as LoDocument;

    fn renderer() -> LogbookRenderer {
        LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .build()
            .expect("renderer")
    }

    fn flights(n: usize, total: &str) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new()
                    .with("Fecha", format!("{:02}/03/2024", (i % 28) + 1))
                    .with("Origen", "LEMD")
                    .with("Destino", "LEBL")
                    .with("Tiempo total de vuelo", total)
            })
            .collect()
    }

    fn page_count(pdf: &[u8]) -> usize {
        LoDocument::load_mem(pdf).expect("load output").get_pages().len()
    }

    #[test]
    fn fourteen_flights_fill_one_page() {
        let pdf = renderer().render(&flights(14, "1:30")).expect("render");
        assert_eq!(page_count(&pdf), 1);
        let page = overlay_content(&pdf, 1).expect("overlay");
        assert_eq!(page.matches("(1:30) Tj").count(), 14);
        // This-page and running rows; carried forward is zero and suppressed.
        assert_eq!(page.matches("(21:00) Tj").count(), 2);
        assert!(page.contains("(01/03/2024) Tj"));
    }

    #[test]
    fn fifteenth_flight_carries_totals_to_page_two() {
        let pdf = renderer().render(&flights(15, "1:30")).expect("render");
        assert_eq!(page_count(&pdf), 2);
        let second = overlay_content(&pdf, 2).expect("page 2 overlay");
        assert_eq!(second.matches("(1:30) Tj").count(), 1);
        assert!(second.contains("(21:00) Tj"));
        assert!(second.contains("(01:30) Tj"));
        assert!(second.contains("(22:30) Tj"));
    }

    #[test]
    fn dash_and_empty_times_render_blank() {
        let records = vec![
            Record::new().with("Origen", "LEMD").with("SE", "--"),
            Record::new().with("Origen", "LEVS").with("SE", ""),
        ];
        let pdf = renderer().render(&records).expect("render");
        let page = overlay_content(&pdf, 1).expect("overlay");
        assert!(page.contains("(LEMD) Tj"));
        assert!(!page.contains("(--)"));
        assert!(!page.contains("(0) Tj"));
        assert!(!page.contains("(00:00) Tj"));
    }

    #[test]
    fn landings_total_per_column() {
        let records = vec![
            Record::new().with("Origen", "LEMD").with("Landings Día", 1i64),
            Record::new()
                .with("Origen", "LECU")
                .with("Landings Día", "1")
                .with("Landings Noche", "1"),
            Record::new().with("Origen", "LEVS"),
        ];
        let (pdf, metrics) = renderer().render_with_metrics(&records).expect("render");
        let page = overlay_content(&pdf, 1).expect("overlay");
        // Landings Día is centered on x = 525.9; "2" is 5.56pt wide at 10pt.
        assert!(page.contains("BT /F1 10 Tf 523.12 "), "{page}");
        assert_eq!(page.matches("(2) Tj").count(), 2);
        assert_eq!(page.matches("(1) Tj").count(), 5);
        assert_eq!(metrics.pages.len(), 1);
        assert_eq!(metrics.pages[0].record_count, 3);
        assert_eq!(metrics.total_bytes, pdf.len());
    }

    #[test]
    fn zero_records_yield_the_bare_template() {
        let pdf = renderer().render(&[]).expect("render");
        assert_eq!(page_count(&pdf), 1);
        assert!(overlay_content(&pdf, 1).is_none());
    }

    #[test]
    fn parallel_rendering_is_byte_identical() {
        let mut records = flights(40, "0:50");
        for (i, record) in records.iter_mut().enumerate() {
            record.set("Landings Noche", (i % 3) as i64);
            record.set("Observaciones", "Vuelo de instrucción con viento cruzado y tráfico");
        }
        let sequential = renderer().render(&records).expect("sequential");
        let parallel = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .parallel(true)
            .build()
            .expect("renderer")
            .render(&records)
            .expect("parallel");
        assert_eq!(sequential, parallel);
        assert_eq!(page_count(&parallel), 3);
    }

    #[test]
    fn normalized_times_and_rendered_zero_totals() {
        let renderer = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .normalize_time_cells(true)
            .zero_totals(ZeroTotals::Render)
            .build()
            .expect("renderer");
        let pdf = renderer
            .render(&[Record::new().with("SE", "1.5")])
            .expect("render");
        let page = overlay_content(&pdf, 1).expect("overlay");
        // Record cell, this-page and running totals.
        assert_eq!(page.matches("(01:30) Tj").count(), 3);
        assert!(page.contains("(00:00) Tj"));
        assert!(page.contains("(0) Tj"));
        assert!(!page.contains("(1.5) Tj"));
    }

    #[test]
    fn layout_from_template_widgets_drives_rendering() {
        let widgets: [(&str, [f32; 4]); 6] = [
            ("Fecha_0", [10.0, 480.0, 60.0, 500.0]),
            ("Fecha_1", [10.0, 460.0, 60.0, 480.0]),
            ("SE_0", [60.0, 480.0, 100.0, 500.0]),
            ("SE_1", [60.0, 460.0, 100.0, 480.0]),
            ("TOTAL DE ESTA PÁGINA SE", [60.0, 440.0, 100.0, 460.0]),
            ("Número de página", [500.0, 560.0, 540.0, 580.0]),
        ];
        let renderer = LogbookRenderer::builder()
            .template_bytes(template_pdf_bytes(800.0, 600.0, &widgets))
            .layout_from_form_fields(true)
            .first_page_number(7)
            .build()
            .expect("renderer");
        assert_eq!(renderer.layout().rows_per_page(), 2);
        let records: Vec<Record> = (0..3).map(|_| Record::new().with("SE", "2:00")).collect();
        let pdf = renderer.render(&records).expect("render");
        assert_eq!(page_count(&pdf), 2);
        let first = overlay_content(&pdf, 1).expect("page 1");
        assert!(first.contains("(04:00) Tj"));
        assert!(first.contains("(7) Tj"));
        let second = overlay_content(&pdf, 2).expect("page 2");
        assert!(second.contains("(02:00) Tj"));
        assert!(second.contains("(8) Tj"));
    }

    #[test]
    fn template_problems_fail_at_build_time() {
        let err = LogbookRenderer::builder().build().err().expect("missing");
        assert!(matches!(err, LogbookError::MissingTemplate));
        let err = LogbookRenderer::builder()
            .template_path(temp_path("no_such_template", "pdf"))
            .build()
            .err()
            .expect("unreadable");
        assert!(matches!(err, LogbookError::TemplateUnreadable(_)));
        let err = LogbookRenderer::builder()
            .template_bytes(b"%PDF-1.4 garbage".to_vec())
            .build()
            .err()
            .expect("garbage");
        assert!(err.is_template_error());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .font_sizes(10, 0)
            .build()
            .err()
            .expect("zero size");
        assert!(err.to_string().contains("font_sizes"));
        let err = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .cell_padding(-1.0)
            .build()
            .err()
            .expect("negative padding");
        assert!(matches!(err, LogbookError::InvalidConfiguration(_)));
        let err = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .layout_json("{}")
            .build()
            .err()
            .expect("bad layout");
        assert!(matches!(err, LogbookError::InvalidConfiguration(_)));
    }

    #[test]
    fn render_to_file_writes_pdf_and_logs() {
        let out = temp_path("render_out", "pdf");
        let debug_path = temp_path("render_debug", "jsonl");
        let perf_path = temp_path("render_perf", "jsonl");
        let layout = Layout::builder(52.441, 344.761)
            .column("Fecha", 0.0, 45.12)
            .column("Observaciones", 45.12, 60.0)
            .column("Legacy", 60.0, 60.3)
            .build()
            .expect("layout");
        let renderer = LogbookRenderer::builder()
            .template_bytes(blank_template_bytes())
            .layout(layout)
            .debug_log(&debug_path)
            .perf_log(&perf_path)
            .build()
            .expect("renderer");
        let records = vec![Record::new().with("Observaciones", "Navegación larga")];
        let metrics = renderer.render_to_file(&records, &out).expect("render");
        assert_eq!(metrics.cells_truncated(), 1);
        assert_eq!(page_count(&std::fs::read(&out).expect("output")), 1);

        let debug = std::fs::read_to_string(&debug_path).expect("debug log");
        assert!(debug.contains("\"type\":\"template.loaded\""));
        assert!(debug.contains("\"type\":\"layout.column.skipped\",\"field\":\"Legacy\""));
        assert!(debug.contains("\"type\":\"render.cell.truncated\""));
        assert!(debug.contains("\"type\":\"debug.summary\""));
        let perf = std::fs::read_to_string(&perf_path).expect("perf log");
        for span in ["paginate", "aggregate", "overlay", "compose"] {
            assert!(perf.contains(&format!("\"name\":\"{span}\"")), "{span}");
        }
        assert!(perf.contains("\"type\":\"perf.page\",\"page\":1,\"records\":1,"));

        drop(renderer);
        for path in [&out, &debug_path, &perf_path] {
            let _ = std::fs::remove_file(path);
        }
    }
}
