/// Per-call tally of what happened to each input field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeMetrics {
    pub fields_total: usize,
    pub drawn: usize,
    /// Zero or negative width/height.
    pub skipped: usize,
    /// Mapped entirely outside the target.
    pub culled: usize,
    /// Text fields with an empty trimmed label.
    pub blank: usize,
    /// Isolated per-field failures.
    pub failed: usize,
    pub vector_text: usize,
    pub raster_text: usize,
    pub render_ms: f64,
    pub output_bytes: usize,
}

impl CompositeMetrics {
    pub(crate) fn new(fields_total: usize) -> Self {
        Self {
            fields_total,
            ..Self::default()
        }
    }

    pub(crate) fn counts(&self) -> [(&'static str, u64); 7] {
        [
            ("drawn", self.drawn as u64),
            ("skipped", self.skipped as u64),
            ("culled", self.culled as u64),
            ("blank", self.blank as u64),
            ("failed", self.failed as u64),
            ("vector_text", self.vector_text as u64),
            ("raster_text", self.raster_text as u64),
        ]
    }
}
