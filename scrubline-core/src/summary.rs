//! Run reporting: tiered processing errors, per-rule tallies and per-unit
//! summaries.
//!
//! Everything here is observational. Summaries are built during a run,
//! returned to the caller and serialized by whatever renders them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How bad a record-time problem is.
///
/// `Warning` lets the record continue, `Error` drops the record, and
/// `Critical` abandons and rolls back the whole source unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Where a processing error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub source_id: String,
    /// 1-based record position within the source, when tied to a record.
    pub position: Option<usize>,
    /// Field path, for field-level anomalies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
}

/// A record-time problem. Collected, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub severity: Severity,
    /// Short machine-readable code such as `missing_type`.
    pub code: String,
    pub message: String,
    pub context: ErrorContext,
}

impl ProcessingError {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn critical(code: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, code, message)
    }

    /// Attaches the source and record position.
    pub fn at(mut self, source_id: &str, position: Option<usize>) -> Self {
        self.context.source_id = source_id.to_string();
        self.context.position = position;
        self
    }

    pub fn in_field(mut self, field_path: &str) -> Self {
        self.context.field_path = Some(field_path.to_string());
        self
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if !self.context.source_id.is_empty() {
            write!(f, " ({}", self.context.source_id)?;
            if let Some(position) = self.context.position {
                write!(f, ":{}", position)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Match total for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTally {
    pub count: usize,
    pub replacement: String,
}

/// Rule id to match count and replacement text, ordered by rule id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSummary {
    pub rules: BTreeMap<String, RuleTally>,
}

impl RuleSummary {
    pub fn record(&mut self, rule_id: &str, count: usize, replacement: &str) {
        if count == 0 {
            return;
        }
        self.rules
            .entry(rule_id.to_string())
            .and_modify(|tally| tally.count += count)
            .or_insert_with(|| RuleTally {
                count,
                replacement: replacement.to_string(),
            });
    }

    pub fn merge(&mut self, other: &RuleSummary) {
        for (rule_id, tally) in &other.rules {
            self.record(rule_id, tally.count, &tally.replacement);
        }
    }

    pub fn count(&self, rule_id: &str) -> usize {
        self.rules.get(rule_id).map_or(0, |tally| tally.count)
    }

    pub fn total(&self) -> usize {
        self.rules.values().map(|tally| tally.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Final state of a source unit's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Committed,
    RolledBack,
}

/// The outcome of ingesting one source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source_id: String,
    pub status: UnitStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records pulled from the stream, including skipped ones.
    pub records_seen: usize,
    /// Rows durable after commit. Zero when rolled back.
    pub records_persisted: usize,
    pub prompts: usize,
    /// New audit rows written (conflicts excluded). Zero when rolled back.
    pub applications_recorded: usize,
    /// Per record-type counts (`record_type` or `record_type.payload_type`),
    /// plus `sanitized_values`.
    pub counts: BTreeMap<String, usize>,
    pub errors: Vec<ProcessingError>,
    pub rules: RuleSummary,
}

impl RunSummary {
    pub fn new(run_id: &str, source_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            source_id: source_id.to_string(),
            status: UnitStatus::Committed,
            started_at: now,
            finished_at: now,
            records_seen: 0,
            records_persisted: 0,
            prompts: 0,
            applications_recorded: 0,
            counts: BTreeMap::new(),
            errors: Vec::new(),
            rules: RuleSummary::default(),
        }
    }

    pub fn bump(&mut self, key: &str, by: usize) {
        if by > 0 {
            *self.counts.entry(key.to_string()).or_insert(0) += by;
        }
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn errors_with(&self, severity: Severity) -> impl Iterator<Item = &ProcessingError> {
        self.errors.iter().filter(move |e| e.severity == severity)
    }

    pub fn is_committed(&self) -> bool {
        self.status == UnitStatus::Committed
    }

    /// The critical error that aborted the unit, if any.
    pub fn critical(&self) -> Option<&ProcessingError> {
        self.errors_with(Severity::Critical).next()
    }
}

/// Summaries for every unit of a multi-source run, with totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub units: Vec<RunSummary>,
}

impl IngestReport {
    pub fn committed(&self) -> usize {
        self.units.iter().filter(|u| u.is_committed()).count()
    }

    pub fn rolled_back(&self) -> usize {
        self.units.len() - self.committed()
    }

    pub fn records_persisted(&self) -> usize {
        self.units.iter().map(|u| u.records_persisted).sum()
    }

    /// Rule totals over committed units only.
    pub fn rule_totals(&self) -> RuleSummary {
        let mut totals = RuleSummary::default();
        for unit in self.units.iter().filter(|u| u.is_committed()) {
            totals.merge(&unit.rules);
        }
        totals
    }

    pub fn error_count(&self, severity: Severity) -> usize {
        self.units.iter().map(|u| u.errors_with(severity).count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_summary_accumulates() {
        let mut summary = RuleSummary::default();
        summary.record("a", 2, "<A>");
        summary.record("a", 3, "<A>");
        summary.record("b", 0, "<B>");
        assert_eq!(summary.count("a"), 5);
        assert_eq!(summary.count("b"), 0);
        assert!(!summary.rules.contains_key("b"));
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_processing_error_display() {
        let err = ProcessingError::error("missing_type", "no type").at("a.jsonl", Some(4));
        assert_eq!(err.to_string(), "[ERROR] missing_type: no type (a.jsonl:4)");
    }

    #[test]
    fn test_report_totals() {
        let mut first = RunSummary::new("run", "a");
        first.records_persisted = 3;
        first.rules.record("r", 2, "x");
        let mut second = RunSummary::new("run", "b");
        second.status = UnitStatus::RolledBack;
        second.rules.record("r", 1, "x");
        second.errors.push(ProcessingError::critical("stream_io", "boom"));

        let report = IngestReport { units: vec![first, second] };
        assert_eq!(report.committed(), 1);
        assert_eq!(report.rolled_back(), 1);
        assert_eq!(report.records_persisted(), 3);
        assert_eq!(report.rule_totals().count("r"), 2);
        assert_eq!(report.error_count(Severity::Critical), 1);
    }
}
