use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Newline-delimited JSON trace of per-field decisions.
///
/// Concurrent calls share the writer only. Each call takes its own id from
/// `begin_call` and tags every line with it; summary counts come from the
/// caller's own metrics.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    writer: Arc<Mutex<BufWriter<Box<dyn Write + Send>>>>,
    next_call: Arc<AtomicU64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(Box::new(writer)))),
            next_call: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ids start at 1.
    pub fn begin_call(&self) -> u64 {
        self.next_call.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{json}");
        }
    }

    pub fn log_field(
        &self,
        call: u64,
        context: &str,
        index: usize,
        kind: &str,
        event: &str,
        detail: &str,
    ) {
        let json = format!(
            "{{\"type\":\"field.{}\",\"call\":{},\"context\":\"{}\",\"index\":{},\"kind\":\"{}\",\"detail\":\"{}\"}}",
            json_escape(event),
            call,
            json_escape(context),
            index,
            json_escape(kind),
            json_escape(detail)
        );
        self.log_json(&json);
    }

    /// Writes one summary line with the non-zero `counts`, sorted by name.
    pub fn emit_summary(&self, call: u64, context: &str, counts: &[(&str, u64)]) {
        let mut counts: Vec<&(&str, u64)> = counts.iter().filter(|(_, n)| *n > 0).collect();
        counts.sort_by(|a, b| a.0.cmp(b.0));
        let counts_json = counts
            .iter()
            .map(|(name, value)| format!("\"{}\":{}", json_escape(name), value))
            .collect::<Vec<_>>()
            .join(",");
        self.log_json(&format!(
            "{{\"type\":\"debug.summary\",\"call\":{},\"context\":\"{}\",\"counts\":{{{}}}}}",
            call,
            json_escape(context),
            counts_json
        ));
    }

    pub fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
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
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_escape_handles_quotes_and_controls() {
        assert_eq!(json_escape("a\"b\\c\n"), "a\\\"b\\\\c\\n");
    }

    fn output(buf: &SharedBuf) -> String {
        String::from_utf8(buf.0.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn field_lines_carry_their_call_id() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::from_writer(buf.clone());
        let call = logger.begin_call();
        logger.log_field(call, "image", 1, "check", "culled", "x=\"-90\"");
        logger.flush();

        let out = output(&buf);
        assert_eq!(
            out.trim_end(),
            "{\"type\":\"field.culled\",\"call\":1,\"context\":\"image\",\"index\":1,\"kind\":\"check\",\"detail\":\"x=\\\"-90\\\"\"}"
        );
    }

    #[test]
    fn summary_lists_non_zero_counts_sorted() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::from_writer(buf.clone());
        logger.emit_summary(7, "image", &[("drawn", 2), ("skipped", 0), ("culled", 1)]);
        logger.flush();
        assert_eq!(
            output(&buf).trim_end(),
            "{\"type\":\"debug.summary\",\"call\":7,\"context\":\"image\",\"counts\":{\"culled\":1,\"drawn\":2}}"
        );
    }

    #[test]
    fn concurrent_calls_keep_separate_ids_and_counts() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::from_writer(buf.clone());
        std::thread::scope(|scope| {
            for drawn in [2u64, 5] {
                let logger = logger.clone();
                scope.spawn(move || {
                    let call = logger.begin_call();
                    for index in 0..drawn as usize {
                        logger.log_field(call, "image", index, "check", "drawn", "");
                    }
                    logger.emit_summary(call, "image", &[("drawn", drawn)]);
                });
            }
        });
        logger.flush();

        let out = output(&buf);
        let summaries: Vec<&str> = out
            .lines()
            .filter(|line| line.contains("debug.summary"))
            .collect();
        assert_eq!(summaries.len(), 2);
        for call in 1..=2 {
            let tag = format!("\"call\":{call},");
            let fields = out
                .lines()
                .filter(|line| line.contains("field.drawn") && line.contains(&tag))
                .count();
            let summary = summaries
                .iter()
                .find(|line| line.contains(&tag))
                .unwrap();
            assert!(summary.contains(&format!("\"drawn\":{fields}}}")), "{summary}");
        }
    }
}
