//! JSONL timing log for the render pipeline: one `perf.span` per stage, one `perf.page` per
//! output page, and a `_hot.log` ranking stages and the slowest pages once the last handle drops.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debug::json_escape;
use crate::metrics::PageMetrics;

const HOT_PAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Paginate,
    Aggregate,
    Overlay,
    OverlayPage,
    Compose,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Paginate => "paginate",
            Stage::Aggregate => "aggregate",
            Stage::Overlay => "overlay",
            Stage::OverlayPage => "overlay.page",
            Stage::Compose => "compose",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StageStats {
    total_ms: f64,
    count: u64,
    max_ms: f64,
    slowest_page: Option<usize>,
}

impl StageStats {
    fn record(&mut self, page: Option<usize>, ms: f64) {
        self.total_ms += ms;
        self.count = self.count.saturating_add(1);
        if self.count == 1 || ms > self.max_ms {
            self.max_ms = ms;
            self.slowest_page = page;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PageTally {
    cells: u64,
    truncated: u64,
    dropped: u64,
    winansi_replaced: u64,
}

#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    stages: BTreeMap<Stage, StageStats>,
    pages: Vec<(usize, f64)>,
    tally: PageTally,
}

fn page_json(page: Option<usize>) -> String {
    page.map_or_else(|| "null".to_string(), |v| v.to_string())
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                stages: BTreeMap::new(),
                pages: Vec::new(),
                tally: PageTally::default(),
            })),
        })
    }

    /// `page` is 1-based; `None` marks a whole-document stage.
    pub fn log_stage(&self, stage: Stage, page: Option<usize>, ms: f64) {
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":\"{}\",\"page\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            stage.name(),
            page_json(page),
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            state.stages.entry(stage).or_default().record(page, ms);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    /// Records one rendered page: its overlay time and what happened to its cells.
    pub fn log_page(&self, metrics: &PageMetrics, winansi_replaced: usize) {
        let page = metrics.page_number;
        let json = format!(
            "{{\"type\":\"perf.page\",\"page\":{},\"records\":{},\"unit\":\"ms\",\"ms\":{:.3},\"cells\":{},\"truncated\":{},\"dropped\":{},\"winansi_replaced\":{},\"bytes\":{}}}",
            page,
            metrics.record_count,
            metrics.render_ms,
            metrics.cells_drawn,
            metrics.cells_truncated,
            metrics.cells_dropped,
            winansi_replaced,
            metrics.content_bytes
        );
        if let Ok(mut state) = self.inner.lock() {
            state
                .stages
                .entry(Stage::OverlayPage)
                .or_default()
                .record(Some(page), metrics.render_ms);
            state.pages.push((page, metrics.render_ms));
            let tally = &mut state.tally;
            tally.cells = tally.cells.saturating_add(metrics.cells_drawn as u64);
            tally.truncated = tally.truncated.saturating_add(metrics.cells_truncated as u64);
            tally.dropped = tally.dropped.saturating_add(metrics.cells_dropped as u64);
            tally.winansi_replaced = tally.winansi_replaced.saturating_add(winansi_replaced as u64);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

/// Times a whole-document stage when a logger is present.
pub(crate) fn timed<T>(perf: Option<&PerfLogger>, stage: Stage, f: impl FnOnce() -> T) -> T {
    let Some(perf) = perf else {
        return f();
    };
    let start = Instant::now();
    let out = f();
    perf.log_stage(stage, None, start.elapsed().as_secs_f64() * 1000.0);
    out
}

impl PerfState {
    fn write_hot(&self, writer: &mut impl Write) -> io::Result<()> {
        let mut stages: Vec<(&Stage, &StageStats)> = self.stages.iter().collect();
        stages.sort_by(|a, b| b.1.total_ms.partial_cmp(&a.1.total_ms).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (stage, stats)) in stages.into_iter().enumerate() {
            let avg = if stats.count == 0 { 0.0 } else { stats.total_ms / stats.count as f64 };
            writeln!(
                writer,
                "{{\"type\":\"perf.hot.stage\",\"rank\":{},\"name\":\"{}\",\"unit\":\"ms\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3},\"max_ms\":{:.3},\"slowest_page\":{}}}",
                rank + 1,
                json_escape(stage.name()),
                stats.total_ms,
                stats.count,
                avg,
                stats.max_ms,
                page_json(stats.slowest_page)
            )?;
        }

        let mut pages = self.pages.clone();
        pages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        for (rank, (page, ms)) in pages.into_iter().take(HOT_PAGES).enumerate() {
            writeln!(
                writer,
                "{{\"type\":\"perf.hot.page\",\"rank\":{},\"page\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
                rank + 1,
                page,
                ms
            )?;
        }

        let tally = self.tally;
        writeln!(
            writer,
            "{{\"type\":\"perf.hot.cells\",\"pages\":{},\"cells\":{},\"truncated\":{},\"dropped\":{},\"winansi_replaced\":{}}}",
            self.pages.len(),
            tally.cells,
            tally.truncated,
            tally.dropped,
            tally.winansi_replaced
        )
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);
        let _ = self.write_hot(&mut writer);
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("logbook_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}
