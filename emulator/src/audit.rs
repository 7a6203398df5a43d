//! Route-change and route-cost logs.
//!
//! Both files are best-effort: an open or write failure is logged and the
//! run carries on. Every line is flushed and synced to disk as soon as it
//! is written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Sink {
    fn open(path: &Path) -> Option<Self> {
        match File::create(path) {
            Ok(file) => Some(Self {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not create audit file");
                None
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        let result = writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .and_then(|_| self.writer.get_ref().sync_data());
        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "Audit write failed");
        }
    }
}

#[derive(Default)]
pub struct AuditLog {
    route_changes: Option<Sink>,
    costs: Option<Sink>,
}

impl AuditLog {
    pub fn open(route_changes: &Path, costs: &Path) -> Self {
        Self {
            route_changes: Sink::open(route_changes),
            costs: Sink::open(costs),
        }
    }

    /// Audit log that writes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn record_path_change(&mut self, elapsed_s: u64, cost_ms: u64, names: &[String]) {
        if let Some(sink) = self.route_changes.as_mut() {
            sink.write_line(&format!(
                "Path change found at time {} with length {} {}",
                elapsed_s,
                cost_ms,
                names.join(" ")
            ));
        }
    }

    pub fn record_cost(&mut self, elapsed_s: u64, cost_ms: u64) {
        if let Some(sink) = self.costs.as_mut() {
            sink.write_line(&format!("Time {}\tCost {}", elapsed_s, cost_ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let changes = dir.path().join("changes.log");
        let costs = dir.path().join("costs.log");
        let mut audit = AuditLog::open(&changes, &costs);

        audit.record_path_change(30, 17, &["GSMadrid".into(), "Sat4".into(), "GSMunich".into()]);
        audit.record_cost(31, 18);

        assert_eq!(
            std::fs::read_to_string(&changes).unwrap(),
            "Path change found at time 30 with length 17 GSMadrid Sat4 GSMunich\n"
        );
        assert_eq!(std::fs::read_to_string(&costs).unwrap(), "Time 31\tCost 18\n");
    }

    #[test]
    fn test_each_line_lands_before_the_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let costs = dir.path().join("costs.log");
        let mut audit = AuditLog::open(&dir.path().join("changes.log"), &costs);

        let mut expected = String::new();
        for t in 0..5 {
            audit.record_cost(t, 10 + t);
            expected.push_str(&format!("Time {}\tCost {}\n", t, 10 + t));
            let on_disk = std::fs::metadata(&costs).unwrap().len();
            assert_eq!(on_disk, expected.len() as u64);
            assert_eq!(std::fs::read_to_string(&costs).unwrap(), expected);
        }
    }

    #[test]
    fn test_unwritable_location_is_not_fatal() {
        let mut audit = AuditLog::open(Path::new("/nonexistent/a.log"), Path::new("/nonexistent/b.log"));
        audit.record_path_change(0, 1, &[]);
        audit.record_cost(0, 1);
    }
}
