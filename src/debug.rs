use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL sink for render diagnostics. Cloned handles share one writer; counters are folded into
/// a single `debug.summary` line when the render finishes.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn template_loaded(&self, sha256: &str, page_count: usize, width: f32, height: f32) {
        self.log_json(&format!(
            "{{\"type\":\"template.loaded\",\"sha256\":\"{}\",\"pages\":{},\"width\":{:.3},\"height\":{:.3}}}",
            json_escape(sha256),
            page_count,
            width,
            height
        ));
    }

    pub fn column_skipped(&self, field: &str, width: f32) {
        self.increment("layout.column.skipped", 1);
        self.log_json(&format!(
            "{{\"type\":\"layout.column.skipped\",\"field\":\"{}\",\"width\":{:.3}}}",
            json_escape(field),
            width
        ));
    }

    pub fn cell_truncated(&self, page: usize, row: Option<usize>, field: &str, original: &str, drawn: &str) {
        self.increment("render.cell.truncated", 1);
        self.log_json(&format!(
            "{{\"type\":\"render.cell.truncated\",\"page\":{},\"row\":{},\"field\":\"{}\",\"text\":\"{}\",\"drawn\":\"{}\"}}",
            page,
            row_json(row),
            json_escape(field),
            json_escape(original),
            json_escape(drawn)
        ));
    }

    pub fn cell_dropped(&self, page: usize, row: Option<usize>, field: &str, original: &str) {
        self.increment("render.cell.dropped", 1);
        self.log_json(&format!(
            "{{\"type\":\"render.cell.dropped\",\"page\":{},\"row\":{},\"field\":\"{}\",\"text\":\"{}\"}}",
            page,
            row_json(row),
            json_escape(field),
            json_escape(original)
        ));
    }

    pub fn winansi_lossy(&self, page: usize, field: &str, text: &str, replaced: usize) {
        self.increment("pdf.winansi.lossy", replaced as u64);
        self.log_json(&format!(
            "{{\"type\":\"pdf.winansi.lossy\",\"page\":{},\"field\":\"{}\",\"text\":\"{}\",\"replaced\":{}}}",
            page,
            json_escape(field),
            json_escape(text),
            replaced
        ));
    }

    pub fn page_rendered(&self, page: usize, records: usize, cells: usize, content_bytes: usize) {
        self.increment("render.page", 1);
        self.log_json(&format!(
            "{{\"type\":\"render.page\",\"page\":{},\"records\":{},\"cells\":{},\"content_bytes\":{}}}",
            page, records, cells, content_bytes
        ));
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts_json = if counters.is_empty() {
                "{}".to_string()
            } else {
                let mut out = String::from("{");
                for (idx, (key, value)) in counters.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    out.push_str(&format!("\"{}\":{}", json_escape(key), value));
                }
                out.push('}');
                out
            };
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts_json
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl Drop for DebugState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

fn row_json(row: Option<usize>) -> String {
    row.map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("logbook_debug_{name}_{}_{}.jsonl", std::process::id(), nanos))
    }

    #[test]
    fn json_escape_handles_quotes_and_controls() {
        assert_eq!(json_escape("a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(json_escape("x\ny"), "x\\ny");
        assert_eq!(json_escape("\u{1}"), "\\u0001");
        assert_eq!(json_escape("Matrícula"), "Matrícula");
    }

    #[test]
    fn summary_sorts_counters_and_every_line_is_json() {
        let path = temp_log("summary");
        {
            let logger = DebugLogger::new(&path).expect("create debug log");
            logger.cell_truncated(1, Some(3), "Observaciones", "a very long remark", "a very...");
            logger.column_skipped("Legacy", 0.2);
            logger.cell_truncated(2, None, "Observaciones", "x", "...");
            logger.emit_summary("render");
            logger.flush();
        }
        let text = std::fs::read_to_string(&path).expect("read debug log");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).expect("jsonl line");
            assert!(value.get("type").is_some());
        }
        let summary: serde_json::Value = serde_json::from_str(lines[3]).expect("summary");
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["render.cell.truncated"], 2);
        assert_eq!(summary["counts"]["layout.column.skipped"], 1);
        let _ = std::fs::remove_file(&path);
    }
}
