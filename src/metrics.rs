#[derive(Debug, Clone, Default)]
pub struct PageMetrics {
    pub page_number: usize,
    pub render_ms: f64,
    pub record_count: usize,
    pub cells_drawn: usize,
    pub cells_truncated: usize,
    pub cells_dropped: usize,
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_render_ms: f64,
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub fn cells_truncated(&self) -> usize {
        self.pages.iter().map(|p| p.cells_truncated).sum()
    }

    pub fn cells_dropped(&self) -> usize {
        self.pages.iter().map(|p| p.cells_dropped).sum()
    }
}
