//! Report Log
//!
//! Append-only JSONL log of tick reports, one line per tick.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use grid_events::TickReport;
use tracing::warn;

pub struct ReportLog {
    writer: Option<BufWriter<File>>,
    report_count: u64,
}

impl ReportLog {
    /// Create a log writing to `path`, truncating any previous contents
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            report_count: 0,
        })
    }

    /// Create a log that discards reports
    pub fn null() -> Self {
        Self {
            writer: None,
            report_count: 0,
        }
    }

    pub fn report_count(&self) -> u64 {
        self.report_count
    }

    pub fn log(&mut self, report: &TickReport) -> std::io::Result<()> {
        self.report_count += 1;
        if let Some(ref mut writer) = self.writer {
            let json = report.to_jsonl()?;
            writeln!(writer, "{}", json)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for ReportLog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush report log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_events::fixtures::sample_report;
    use std::io::BufRead;
    use tempfile::tempdir;

    #[test]
    fn test_report_logging() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs").join("reports.jsonl");

        let mut log = ReportLog::new(&path).unwrap();
        let mut second = sample_report();
        second.tick = 8;
        log.log(&sample_report()).unwrap();
        log.log(&second).unwrap();
        log.flush().unwrap();
        assert_eq!(log.report_count(), 2);

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let parsed: TickReport = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed, sample_report());
        let second: TickReport = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second.tick, 8);
    }

    #[test]
    fn test_flush_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        {
            let mut log = ReportLog::new(&path).unwrap();
            log.log(&sample_report()).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_null_log() {
        let mut log = ReportLog::null();
        log.log(&sample_report()).unwrap();
        assert_eq!(log.report_count(), 1);
    }
}
