use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use logbook_pdf::{DocumentMetrics, LogbookError, LogbookRenderer, Record, ZeroTotals};

/// Fill a blank pilot logbook PDF with flight records
#[derive(Parser, Debug)]
#[command(
    name = "logbook-pdf",
    version = env!("CARGO_PKG_VERSION"),
    about = "Paginate flight records onto a blank logbook template with per-page and carried-forward totals",
    long_about = None
)]
struct Cli {
    /// Blank logbook template (PDF, first page is used)
    #[arg(long)]
    template: PathBuf,

    /// Flight records as CSV, one flight per row
    #[arg(long)]
    records: PathBuf,

    /// Output PDF path
    #[arg(long)]
    out: PathBuf,

    /// JSON layout descriptor overriding the built-in logbook geometry
    #[arg(long, conflicts_with = "form_layout")]
    layout: Option<PathBuf>,

    /// Derive the layout from the template's form fields
    #[arg(long)]
    form_layout: bool,

    /// TrueType/OpenType font to embed instead of Helvetica
    #[arg(long)]
    font_file: Option<PathBuf>,

    /// Print totals that add up to zero as 00:00 / 0
    #[arg(long)]
    render_zero_totals: bool,

    /// Print time cells as HH:MM instead of the entered text
    #[arg(long)]
    normalize_times: bool,

    /// Aggregate and render pages on all cores
    #[arg(long)]
    parallel: bool,

    #[arg(long, default_value_t = 1)]
    first_page_number: usize,

    /// Write JSONL render diagnostics to this file
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Write JSONL timing spans to this file
    #[arg(long)]
    perf_log: Option<PathBuf>,

    /// CSV field delimiter
    #[arg(long, default_value_t = ';')]
    delimiter: char,
}

fn csv_error(err: csv::Error) -> LogbookError {
    LogbookError::InvalidConfiguration(format!("records CSV: {err}"))
}

/// Reads CSV rows into records. A first row whose first cell is `Fecha` is a header mapping
/// columns by name; otherwise cells follow the logbook column order and extra trailing cells
/// (such as an export timestamp) are ignored. A row of empty cells is a blank logbook line and
/// keeps its position; blank lines are skipped by the reader.
fn read_records(reader: impl Read, delimiter: u8) -> Result<Vec<Record>, LogbookError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut header: Option<Vec<Option<&'static str>>> = None;
    let mut records = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        let row = row.map_err(csv_error)?;
        let cells: Vec<&str> = row
            .iter()
            .enumerate()
            .map(|(col, cell)| if idx == 0 && col == 0 { cell.trim_start_matches('\u{feff}') } else { cell })
            .collect();
        if idx == 0 && cells.first().is_some_and(|c| c.eq_ignore_ascii_case("fecha")) {
            header = Some(
                cells
                    .iter()
                    .map(|name| logbook_contract::field_def_case_insensitive(name).map(|d| d.name))
                    .collect(),
            );
            continue;
        }
        let record: Record = match &header {
            Some(columns) => columns
                .iter()
                .zip(cells.iter())
                .filter_map(|(field, cell)| field.map(|f| (f, *cell)))
                .collect(),
            None => Record::from_ordered_cells(cells.iter().copied()),
        };
        records.push(record);
    }
    Ok(records)
}

fn run(cli: Cli) -> Result<(usize, DocumentMetrics), LogbookError> {
    let delimiter = u8::try_from(cli.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            LogbookError::InvalidConfiguration(format!("delimiter must be ASCII (got {:?})", cli.delimiter))
        })?;

    let mut builder = LogbookRenderer::builder()
        .template_path(&cli.template)
        .normalize_time_cells(cli.normalize_times)
        .parallel(cli.parallel)
        .first_page_number(cli.first_page_number)
        .layout_from_form_fields(cli.form_layout);
    if let Some(path) = &cli.layout {
        builder = builder.layout_json(std::fs::read_to_string(path)?);
    }
    if let Some(path) = &cli.font_file {
        builder = builder.font_file(path);
    }
    if cli.render_zero_totals {
        builder = builder.zero_totals(ZeroTotals::Render);
    }
    if let Some(path) = &cli.debug_log {
        builder = builder.debug_log(path);
    }
    if let Some(path) = &cli.perf_log {
        builder = builder.perf_log(path);
    }
    let renderer = builder.build()?;

    let file = std::fs::File::open(&cli.records)
        .map_err(|err| LogbookError::InvalidConfiguration(format!("{}: {err}", cli.records.display())))?;
    let records = read_records(file, delimiter)?;
    let metrics = renderer.render_to_file(&records, &cli.out)?;
    Ok((records.len(), metrics))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = cli.out.clone();
    match run(cli) {
        Ok((records, metrics)) => {
            println!(
                "{} records -> {} pages ({} bytes) written to {}",
                records,
                metrics.pages.len().max(1),
                metrics.total_bytes,
                out.display()
            );
            let truncated = metrics.cells_truncated();
            let dropped = metrics.cells_dropped();
            if truncated + dropped > 0 {
                eprintln!("[logbook-pdf] {truncated} cells truncated, {dropped} cells left blank");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[logbook-pdf] error: {err}");
            ExitCode::FAILURE
        }
    }
}
