//! Append-only JSONL audit log and its read-side report.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use consilium_core::{defaults, Error, IntegrityRecord, Result};

/// Filters for the integrity report aggregation.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub matter_id: Option<String>,
    pub status: Option<String>,
    pub doc_id: Option<String>,
    /// Keep only mismatches and errors.
    pub only_failed: bool,
    pub limit: usize,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            matter_id: None,
            status: None,
            doc_id: None,
            only_failed: false,
            limit: defaults::INTEGRITY_REPORT_LIMIT,
        }
    }
}

impl ReportFilter {
    fn matches(&self, record: &IntegrityRecord) -> bool {
        if let Some(matter_id) = &self.matter_id {
            if &record.matter_id != matter_id {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &record.status != status {
                return false;
            }
        }
        if let Some(doc_id) = &self.doc_id {
            if &record.doc_id != doc_id {
                return false;
            }
        }
        if self.only_failed && !record.is_failed() {
            return false;
        }
        true
    }
}

/// The durable audit trail: one JSON object per line, append-only.
///
/// Writers append self-contained lines without locking; readers skip
/// unparsable lines so a partially written tail never breaks the report.
pub struct IntegrityLog {
    path: PathBuf,
}

impl IntegrityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub fn append(&self, record: &IntegrityRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::Io)?;
        writeln!(file, "{line}").map_err(Error::Io)?;
        Ok(())
    }

    /// Aggregate the log into a report.
    ///
    /// Scans newest to oldest keeping the first record seen per `doc_id`,
    /// applies the filters, stops at the limit, and returns records ordered
    /// by timestamp descending. A missing log file is an empty report.
    pub fn report(&self, filter: &ReportFilter) -> Result<Vec<IntegrityRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut records: Vec<IntegrityRecord> = Vec::new();

        for line in raw.lines().rev() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: IntegrityRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(_) => {
                    debug!(
                        subsystem = "integrity",
                        component = "log",
                        "Skipping unparsable audit line"
                    );
                    continue;
                }
            };
            if !seen.insert(record.doc_id.clone()) {
                continue;
            }
            if !filter.matches(&record) {
                continue;
            }
            records.push(record);
            if records.len() >= filter.limit {
                break;
            }
        }

        records.sort_by(|a, b| b.ts.cmp(&a.ts));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use consilium_core::IntegrityResult;
    use std::fs::File;

    fn record(doc_id: &str, matter_id: &str, matches: bool, age_secs: i64) -> IntegrityRecord {
        IntegrityRecord {
            ts: Utc::now() - Duration::seconds(age_secs),
            doc_id: doc_id.to_string(),
            matter_id: matter_id.to_string(),
            status: "registered".to_string(),
            result: Some(IntegrityResult {
                matches,
                sha256_current: "c".repeat(64),
                sha256_stored: if matches { "c".repeat(64) } else { "d".repeat(64) },
            }),
            error: None,
        }
    }

    fn error_record(doc_id: &str, age_secs: i64) -> IntegrityRecord {
        IntegrityRecord {
            ts: Utc::now() - Duration::seconds(age_secs),
            doc_id: doc_id.to_string(),
            matter_id: "M-1".to_string(),
            status: "registered".to_string(),
            result: None,
            error: Some("fetch failed".to_string()),
        }
    }

    fn temp_log() -> (tempfile::TempDir, IntegrityLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = IntegrityLog::new(dir.path().join("integrity.jsonl"));
        (dir, log)
    }

    #[test]
    fn test_missing_file_is_empty_report() {
        let (_dir, log) = temp_log();
        let report = log.report(&ReportFilter::default()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_append_and_read_back() {
        let (_dir, log) = temp_log();
        log.append(&record("D-1", "M-1", true, 0)).unwrap();

        let report = log.report(&ReportFilter::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].doc_id, "D-1");
        assert!(report[0].result.as_ref().unwrap().matches);
    }

    #[test]
    fn test_report_keeps_newest_per_doc() {
        let (_dir, log) = temp_log();
        // Older mismatch, then a newer match for the same doc.
        log.append(&record("D-1", "M-1", false, 100)).unwrap();
        log.append(&record("D-1", "M-1", true, 10)).unwrap();

        let report = log.report(&ReportFilter::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert!(report[0].result.as_ref().unwrap().matches, "newest wins");
    }

    #[test]
    fn test_report_orders_by_timestamp_descending() {
        let (_dir, log) = temp_log();
        log.append(&record("D-old", "M-1", true, 300)).unwrap();
        log.append(&record("D-new", "M-1", true, 5)).unwrap();
        log.append(&record("D-mid", "M-1", true, 60)).unwrap();

        let report = log.report(&ReportFilter::default()).unwrap();
        let ids: Vec<&str> = report.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["D-new", "D-mid", "D-old"]);
    }

    #[test]
    fn test_report_only_failed() {
        let (_dir, log) = temp_log();
        log.append(&record("D-ok", "M-1", true, 30)).unwrap();
        log.append(&record("D-drift", "M-1", false, 20)).unwrap();
        log.append(&error_record("D-err", 10)).unwrap();

        let report = log
            .report(&ReportFilter {
                only_failed: true,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<&str> = report.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["D-err", "D-drift"]);
    }

    #[test]
    fn test_report_filters_by_matter_and_doc() {
        let (_dir, log) = temp_log();
        log.append(&record("D-1", "M-1", true, 30)).unwrap();
        log.append(&record("D-2", "M-2", true, 20)).unwrap();

        let by_matter = log
            .report(&ReportFilter {
                matter_id: Some("M-2".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_matter.len(), 1);
        assert_eq!(by_matter[0].doc_id, "D-2");

        let by_doc = log
            .report(&ReportFilter {
                doc_id: Some("D-1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_doc.len(), 1);
        assert_eq!(by_doc[0].matter_id, "M-1");
    }

    #[test]
    fn test_report_respects_limit() {
        let (_dir, log) = temp_log();
        for i in 0..10 {
            log.append(&record(&format!("D-{i}"), "M-1", true, i)).unwrap();
        }

        let report = log
            .report(&ReportFilter {
                limit: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn test_report_skips_unparsable_lines() {
        let (_dir, log) = temp_log();
        log.append(&record("D-1", "M-1", true, 10)).unwrap();
        // Simulate a torn write at the tail.
        {
            let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
            writeln!(file, "{{\"ts\": \"2026-08-").unwrap();
        }

        let report = log.report(&ReportFilter::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].doc_id, "D-1");
    }

    #[test]
    fn test_empty_file_is_empty_report() {
        let (_dir, log) = temp_log();
        File::create(log.path()).unwrap();
        assert!(log.report(&ReportFilter::default()).unwrap().is_empty());
    }
}
