// scrubline-core/src/persistence.rs
//! The persistence gateway contract and an in-memory implementation.
//!
//! The coordinator opens one transaction per source unit with
//! [`PersistenceGateway::begin`], stages rows and audit entries into it, and
//! either commits or rolls back. Committing a source replaces whatever rows
//! that source had before, so re-ingesting a file is idempotent. Audit
//! entries are append-only; [`PersistenceGateway::insert_application_if_absent`]
//! reports a conflict as `Ok(false)`, never as an error.
//!
//! Physical storage lives outside this crate. [`InMemoryGateway`] backs tests
//! and dry runs.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::audit::{ApplicationKey, RedactionApplication};

/// Where a row sits in its source's prompt grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Before the first prompt.
    Session,
    /// The record that opened a prompt.
    Prompt,
    /// A record attached to the current prompt.
    Event,
}

impl RowKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "session" => Some(Self::Session),
            "prompt" => Some(Self::Prompt),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Prompt => "prompt",
            Self::Event => "event",
        }
    }
}

/// One normalized, sanitized and redacted record ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub source_id: String,
    /// 1-based record position in the source.
    pub position: usize,
    pub prompt_index: Option<u32>,
    pub kind: RowKind,
    pub record_type: String,
    pub payload_type: Option<String>,
    pub timestamp: Option<String>,
    /// Redacted text per field path.
    pub fields: BTreeMap<String, String>,
    pub payload: Value,
    pub metadata: Value,
}

/// Transactional storage for one source unit at a time.
pub trait PersistenceGateway {
    /// Opens the unit transaction for `source_id`.
    fn begin(&mut self, source_id: &str) -> Result<()>;

    /// Stages a batch of rows in the open transaction.
    fn stage_records(&mut self, rows: &[RecordRow]) -> Result<()>;

    /// Inserts an audit entry unless one with the same key exists. Returns
    /// `false` on conflict.
    fn insert_application_if_absent(&mut self, application: &RedactionApplication) -> Result<bool>;

    /// Makes the unit durable, replacing the source's previous rows.
    fn commit(&mut self) -> Result<()>;

    /// Discards everything staged since `begin`.
    fn rollback(&mut self) -> Result<()>;
}

/// Where an [`InMemoryGateway`] fails on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// `stage_records` fails once the open unit already holds this many rows.
    StageAfter(usize),
    /// Every `insert_application_if_absent` fails.
    InsertApplication,
    Commit,
}

/// Gateway holding everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    open: Option<String>,
    staged_records: Vec<RecordRow>,
    staged_applications: Vec<RedactionApplication>,
    staged_keys: HashSet<ApplicationKey>,
    records: BTreeMap<String, Vec<RecordRow>>,
    applications: Vec<RedactionApplication>,
    keys: HashSet<ApplicationKey>,
    failure: Option<FailurePoint>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that fails at `point`, for exercising abort paths.
    pub fn with_failure(point: FailurePoint) -> Self {
        Self {
            failure: Some(point),
            ..Self::default()
        }
    }

    pub fn with_failing_commit() -> Self {
        Self::with_failure(FailurePoint::Commit)
    }

    /// Arms or clears the failure point. Committed data is kept.
    pub fn set_failure(&mut self, failure: Option<FailurePoint>) {
        self.failure = failure;
    }

    /// Committed rows of one source, in stage order.
    pub fn records(&self, source_id: &str) -> &[RecordRow] {
        self.records.get(source_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Committed audit entries, in insertion order.
    pub fn applications(&self) -> &[RedactionApplication] {
        &self.applications
    }

    /// Adds an audit entry outside of any unit, e.g. a manual redaction.
    pub fn record_manual(&mut self, application: RedactionApplication) -> bool {
        if self.keys.insert(application.key()) {
            self.applications.push(application);
            true
        } else {
            false
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    fn clear_staged(&mut self) {
        self.open = None;
        self.staged_records.clear();
        self.staged_applications.clear();
        self.staged_keys.clear();
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn begin(&mut self, source_id: &str) -> Result<()> {
        if let Some(open) = &self.open {
            bail!("cannot begin '{}': unit '{}' is still open", source_id, open);
        }
        self.open = Some(source_id.to_string());
        Ok(())
    }

    fn stage_records(&mut self, rows: &[RecordRow]) -> Result<()> {
        if self.open.is_none() {
            bail!("stage_records called without an open unit");
        }
        if let Some(FailurePoint::StageAfter(limit)) = self.failure {
            if self.staged_records.len() >= limit {
                bail!("staging failed after {} row(s)", limit);
            }
        }
        self.staged_records.extend_from_slice(rows);
        Ok(())
    }

    fn insert_application_if_absent(&mut self, application: &RedactionApplication) -> Result<bool> {
        if self.open.is_none() {
            bail!("insert_application_if_absent called without an open unit");
        }
        if self.failure == Some(FailurePoint::InsertApplication) {
            bail!("audit insert failed");
        }
        let key = application.key();
        if self.keys.contains(&key) || !self.staged_keys.insert(key) {
            return Ok(false);
        }
        self.staged_applications.push(application.clone());
        Ok(true)
    }

    fn commit(&mut self) -> Result<()> {
        let Some(source_id) = self.open.clone() else {
            bail!("commit called without an open unit");
        };
        if self.failure == Some(FailurePoint::Commit) {
            bail!("commit of '{}' failed", source_id);
        }
        let rows = std::mem::take(&mut self.staged_records);
        self.records.insert(source_id, rows);
        self.keys.extend(self.staged_keys.drain());
        self.applications.append(&mut self.staged_applications);
        self.clear_staged();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.clear_staged();
        Ok(())
    }
}
