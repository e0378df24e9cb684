// scrubline-core/src/coordinator.rs
//! The ingest coordinator.
//!
//! One source unit (one file) is one transaction. Each record goes through
//! validate, sanitize, group, rule-apply and stage; rows are handed to the
//! gateway in batches of `batch_size` and the unit is committed at the end,
//! or rolled back as soon as anything `CRITICAL` happens.
//!
//! Severity policy:
//! - `WARNING`: the record continues with a default filled in.
//! - `ERROR`: the record is skipped, the unit continues.
//! - `CRITICAL`: the rest of the unit is abandoned and rolled back. Units
//!   committed earlier are untouched.
//!
//! `CRITICAL` is raised for stream read failures, an unreadable first record
//! and every gateway failure.

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{PendingApplication, RedactionApplication};
use crate::config::{FieldTarget, IngestConfig};
use crate::content::{ContentUnit, OwnerScope};
use crate::engine::{RedactionEngine, RuleEngine};
use crate::normalizer::{normalize, NormalizedRecord};
use crate::persistence::{PersistenceGateway, RecordRow, RowKind};
use crate::rules::compiler::CompiledRules;
use crate::sanitizer::Sanitizer;
use crate::summary::{IngestReport, ProcessingError, RuleSummary, RunSummary, Severity, UnitStatus};

/// A failure reported by the record stream feeding a unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The item could not be decoded into a record.
    #[error("malformed record: {0}")]
    Malformed(String),
    /// The underlying reader failed.
    #[error("stream read failed: {0}")]
    Io(String),
}

// Per-unit working state.
#[derive(Default)]
struct UnitState {
    prompt_index: Option<u32>,
    batch: Vec<RecordRow>,
    pending: Vec<RedactionApplication>,
    staged_rows: usize,
    recorded_applications: usize,
}

/// Drives records from a stream through the pipeline into a gateway.
pub struct IngestCoordinator<G: PersistenceGateway> {
    engine: Box<dyn RedactionEngine>,
    sanitizer: Sanitizer,
    config: IngestConfig,
    gateway: G,
    run_id: String,
}

impl<G: PersistenceGateway> IngestCoordinator<G> {
    /// Builds a coordinator around a compiled rule set.
    pub fn new(rules: Arc<CompiledRules>, config: IngestConfig, gateway: G) -> Result<Self> {
        Self::with_engine(Box::new(RuleEngine::new(rules)), config, gateway)
    }

    pub fn with_engine(engine: Box<dyn RedactionEngine>, config: IngestConfig, gateway: G) -> Result<Self> {
        config.validate()?;
        let sanitizer = Sanitizer::new(&config.sanitizer)?;
        let run_id = Uuid::new_v4().to_string();
        debug!(
            "Coordinator ready: run {}, {} rule(s), batch size {}, sanitizer {}",
            run_id,
            engine.compiled_rules().len(),
            config.batch_size,
            if sanitizer.is_enabled() { "on" } else { "off" }
        );
        Ok(Self {
            engine,
            sanitizer,
            config,
            gateway,
            run_id,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Ingests every unit in order. A rolled-back unit does not stop the run.
    pub fn ingest_all<U, R>(&mut self, units: U) -> IngestReport
    where
        U: IntoIterator<Item = (String, R)>,
        R: IntoIterator<Item = Result<Value, StreamError>>,
    {
        let mut report = IngestReport::default();
        for (source_id, records) in units {
            report.units.push(self.ingest_unit(&source_id, records));
        }
        info!(
            "Run {} finished: {} committed, {} rolled back, {} rows",
            self.run_id,
            report.committed(),
            report.rolled_back(),
            report.records_persisted()
        );
        report
    }

    /// Ingests one source unit inside one gateway transaction. Always returns
    /// a summary; failures are reported in it rather than raised.
    pub fn ingest_unit<R>(&mut self, source_id: &str, records: R) -> RunSummary
    where
        R: IntoIterator<Item = Result<Value, StreamError>>,
    {
        let mut summary = RunSummary::new(&self.run_id, source_id);
        info!("Ingesting {}", source_id);

        if let Err(e) = self.gateway.begin(source_id) {
            let critical = ProcessingError::critical("persistence_failure", format!("{:#}", e)).at(source_id, None);
            return self.abort(summary, critical);
        }

        let mut state = UnitState::default();
        for (index, item) in records.into_iter().enumerate() {
            let position = index + 1;
            summary.records_seen += 1;

            let raw = match item {
                Ok(raw) => raw,
                Err(StreamError::Io(message)) => {
                    let critical = ProcessingError::critical("stream_io", message).at(source_id, Some(position));
                    return self.abort(summary, critical);
                }
                Err(StreamError::Malformed(message)) if position == 1 => {
                    let critical =
                        ProcessingError::critical("corrupt_header", message).at(source_id, Some(position));
                    return self.abort(summary, critical);
                }
                Err(StreamError::Malformed(message)) => {
                    let err = ProcessingError::error("malformed_record", message).at(source_id, Some(position));
                    warn!("Skipping record: {}", err);
                    summary.errors.push(err);
                    continue;
                }
            };

            if let Some(row) = self.process_record(source_id, position, raw, &mut state, &mut summary) {
                state.batch.push(row);
            }

            if state.batch.len() >= self.config.batch_size {
                if let Err(e) = self.flush(&mut state) {
                    let critical =
                        ProcessingError::critical("persistence_failure", format!("{:#}", e)).at(source_id, Some(position));
                    return self.abort(summary, critical);
                }
            }
        }

        if let Err(e) = self.flush(&mut state).and_then(|_| self.gateway.commit()) {
            let critical = ProcessingError::critical("persistence_failure", format!("{:#}", e)).at(source_id, None);
            return self.abort(summary, critical);
        }

        summary.status = UnitStatus::Committed;
        summary.records_persisted = state.staged_rows;
        summary.applications_recorded = state.recorded_applications;
        summary.finished_at = Utc::now();
        info!(
            "Committed {}: {} row(s), {} prompt(s), {} new redaction record(s), {} warning(s), {} error(s)",
            source_id,
            summary.records_persisted,
            summary.prompts,
            summary.applications_recorded,
            summary.errors_with(Severity::Warning).count(),
            summary.errors_with(Severity::Error).count()
        );
        summary
    }

    // Runs one decoded record through validate, sanitize, group and
    // rule-apply. `None` means the record was skipped.
    fn process_record(
        &self,
        source_id: &str,
        position: usize,
        raw: Value,
        state: &mut UnitState,
        summary: &mut RunSummary,
    ) -> Option<RecordRow> {
        let normalized = match normalize(raw) {
            Ok(normalized) => normalized,
            Err(err) => {
                let err = err.at(source_id, Some(position));
                warn!("Skipping record: {}", err);
                summary.errors.push(err);
                return None;
            }
        };
        for warning in normalized.warnings {
            let warning = warning.at(source_id, Some(position));
            warn!("{}", warning);
            summary.errors.push(warning);
        }
        summary.bump(&normalized.record.count_key(), 1);
        let NormalizedRecord {
            record_type,
            payload_type,
            timestamp,
            payload,
            metadata,
            ..
        } = normalized.record;

        let mut payload = Value::Object(payload);
        let mut metadata = Value::Object(metadata);
        let sanitized = self.sanitizer.sanitize_value(&mut payload) + self.sanitizer.sanitize_value(&mut metadata);
        summary.bump("sanitized_values", sanitized);

        let anchor = &self.config.prompt_anchor;
        let kind = if record_type == anchor.record_type && payload_type.as_deref() == Some(anchor.payload_type.as_str())
        {
            let next = state.prompt_index.map_or(1, |i| i + 1);
            state.prompt_index = Some(next);
            summary.prompts += 1;
            RowKind::Prompt
        } else if state.prompt_index.is_some() {
            RowKind::Event
        } else {
            RowKind::Session
        };
        let scope = OwnerScope::new(source_id, state.prompt_index);

        let redaction = redact_fields(
            self.engine.as_ref(),
            &self.config.fields,
            &record_type,
            payload_type.as_deref(),
            &mut payload,
            &scope,
        );
        for warning in redaction.warnings {
            let warning = warning.at(source_id, Some(position));
            warn!("{}", warning);
            summary.errors.push(warning);
        }
        summary.rules.merge(&redaction.rules);
        let applied_at = Utc::now();
        state
            .pending
            .extend(redaction.pending.into_iter().map(|p| p.into_application(applied_at)));
        let fields = redaction.fields;

        Some(RecordRow {
            source_id: source_id.to_string(),
            position,
            prompt_index: state.prompt_index,
            kind,
            record_type,
            payload_type,
            timestamp,
            fields,
            payload,
            metadata,
        })
    }

    fn flush(&mut self, state: &mut UnitState) -> Result<()> {
        if !state.batch.is_empty() {
            self.gateway.stage_records(&state.batch)?;
            state.staged_rows += state.batch.len();
            debug!("Staged batch of {} row(s)", state.batch.len());
            state.batch.clear();
        }
        for application in state.pending.drain(..) {
            if self.gateway.insert_application_if_absent(&application)? {
                state.recorded_applications += 1;
            }
        }
        Ok(())
    }

    fn abort(&mut self, mut summary: RunSummary, critical: ProcessingError) -> RunSummary {
        error!("Aborting {}: {}", summary.source_id, critical);
        if let Err(e) = self.gateway.rollback() {
            error!("Rollback of {} failed: {:#}", summary.source_id, e);
        }
        summary.errors.push(critical);
        summary.status = UnitStatus::RolledBack;
        summary.records_persisted = 0;
        summary.applications_recorded = 0;
        summary.finished_at = Utc::now();
        info!("Rolled back {}", summary.source_id);
        summary
    }
}

/// What running a record's field targets through the engine produced.
#[derive(Debug, Default)]
pub struct FieldRedaction {
    /// Redacted text per field path; wildcard matches joined with `\n`.
    pub fields: BTreeMap<String, String>,
    pub rules: RuleSummary,
    pub pending: Vec<PendingApplication>,
    /// `non_text_field` warnings, without source context.
    pub warnings: Vec<ProcessingError>,
}

/// Applies `engine` to every configured field target of one record and
/// writes changed text back into `payload`. Structured values that no rule
/// changed keep their JSON type.
pub fn redact_fields(
    engine: &dyn RedactionEngine,
    targets: &[FieldTarget],
    record_type: &str,
    payload_type: Option<&str>,
    payload: &mut Value,
    scope: &OwnerScope,
) -> FieldRedaction {
    let mut out = FieldRedaction::default();
    for target in targets {
        if !target.applies_to(record_type, payload_type) {
            continue;
        }
        for slot in select_mut(payload, &target.pointer) {
            let text = match &*slot {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                other => {
                    out.warnings.push(
                        ProcessingError::warning(
                            "non_text_field",
                            format!("{} is not a string; redacting its JSON text", target.field_path),
                        )
                        .in_field(&target.field_path),
                    );
                    other.to_string()
                }
            };

            let unit = ContentUnit::new(&text, target.class, scope, &target.field_path);
            let output = engine.apply(&unit);
            out.rules.merge(&output.summary);
            out.pending.extend(output.pending);

            let redacted = output.value;
            if redacted != text {
                *slot = Value::String(redacted.clone());
            }
            out.fields
                .entry(target.field_path.clone())
                .and_modify(|joined: &mut String| {
                    joined.push('\n');
                    joined.push_str(&redacted);
                })
                .or_insert(redacted);
        }
    }
    out
}

/// Resolves a JSON pointer against `root`, where a `*` segment fans out over
/// every element of an array. Missing paths resolve to nothing.
pub fn select_mut<'v>(root: &'v mut Value, pointer: &str) -> Vec<&'v mut Value> {
    let segments: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    let mut found = Vec::new();
    collect_mut(root, &segments, &mut found);
    found
}

fn collect_mut<'v>(value: &'v mut Value, segments: &[String], found: &mut Vec<&'v mut Value>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };
    match value {
        Value::Array(items) => {
            if head == "*" {
                for item in items.iter_mut() {
                    collect_mut(item, rest, found);
                }
            } else if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                collect_mut(item, rest, found);
            }
        }
        Value::Object(map) => {
            if let Some(item) = map.get_mut(head.as_str()) {
                collect_mut(item, rest, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSpec;
    use crate::persistence::InMemoryGateway;
    use crate::rules::compiler::compile_rules;
    use serde_json::json;

    fn coordinator(specs: Vec<RuleSpec>) -> IngestCoordinator<InMemoryGateway> {
        let rules = Arc::new(compile_rules(&specs).unwrap());
        IngestCoordinator::new(rules, IngestConfig::default(), InMemoryGateway::new()).unwrap()
    }

    fn prompt(text: &str) -> Result<Value, StreamError> {
        Ok(json!({
            "type": "event_msg",
            "timestamp": "2025-01-01T00:00:00Z",
            "payload": {"type": "user_message", "message": text}
        }))
    }

    #[test]
    fn test_select_mut_wildcard() {
        let mut value = json!({"content": [{"text": "a"}, {"image": 1}, {"text": "b"}]});
        let found = select_mut(&mut value, "/content/*/text");
        assert_eq!(found.len(), 2);
        for slot in found {
            *slot = json!("x");
        }
        assert_eq!(value["content"][2]["text"], "x");
        assert!(select_mut(&mut value, "/missing/path").is_empty());
    }

    #[test]
    fn test_select_mut_escapes_and_indices() {
        let mut value = json!({"a/b": [10, 20]});
        let found = select_mut(&mut value, "/a~1b/1");
        assert_eq!(found.len(), 1);
        assert_eq!(*found[0], json!(20));
    }

    #[test]
    fn test_grouping_assigns_prompt_indices() {
        let mut c = coordinator(vec![]);
        let records = vec![
            Ok(json!({"type": "session_meta", "timestamp": "2025-01-01T00:00:00Z", "payload": {}})),
            prompt("first"),
            Ok(json!({"type": "event_msg", "timestamp": "2025-01-01T00:00:01Z",
                      "payload": {"type": "agent_message", "message": "ok"}})),
            prompt("second"),
        ];
        let summary = c.ingest_unit("s.jsonl", records);
        assert!(summary.is_committed());
        assert_eq!(summary.prompts, 2);

        let rows = c.gateway().records("s.jsonl");
        let kinds: Vec<_> = rows.iter().map(|r| (r.kind, r.prompt_index)).collect();
        assert_eq!(
            kinds,
            vec![
                (RowKind::Session, None),
                (RowKind::Prompt, Some(1)),
                (RowKind::Event, Some(1)),
                (RowKind::Prompt, Some(2)),
            ]
        );
        assert_eq!(rows[1].fields["prompt.message"], "first");
        assert_eq!(summary.count("event_msg.user_message"), 2);
        assert_eq!(summary.count("session_meta"), 1);
    }

    #[test]
    fn test_redaction_writes_back_and_stages_applications() {
        let mut c = coordinator(vec![RuleSpec::new("email", "regex", r"\S+@\S+").with_replacement("<EMAIL>")]);
        let summary = c.ingest_unit("s.jsonl", vec![prompt("mail me at a@b.co")]);
        assert_eq!(summary.rules.count("email"), 1);
        assert_eq!(summary.applications_recorded, 1);

        let row = &c.gateway().records("s.jsonl")[0];
        assert_eq!(row.payload["message"], "mail me at <EMAIL>");
        assert_eq!(row.fields["prompt.message"], "mail me at <EMAIL>");

        let application = &c.gateway().applications()[0];
        assert_eq!(application.rule_id.as_deref(), Some("email"));
        assert_eq!(application.field_path, "prompt.message");
        assert_eq!(application.scope, OwnerScope::new("s.jsonl", Some(1)));
    }

    #[test]
    fn test_non_text_field_is_warned_and_redacted() {
        let mut c = coordinator(vec![RuleSpec::new("n", "regex", "42").with_scope("field").with_replacement("N")]);
        let summary = c.ingest_unit(
            "s.jsonl",
            vec![Ok(json!({"type": "response_item", "timestamp": "2025-01-01T00:00:00Z",
                           "payload": {"type": "function_call", "arguments": {"x": 42}}}))],
        );
        let warning = summary.errors_with(Severity::Warning).next().unwrap();
        assert_eq!(warning.code, "non_text_field");
        assert_eq!(warning.context.field_path.as_deref(), Some("function_call.arguments"));
        let row = &c.gateway().records("s.jsonl")[0];
        assert_eq!(row.payload["arguments"], "{\"x\":N}");
    }

    #[test]
    fn test_non_text_field_without_match_keeps_its_type() {
        let mut c = coordinator(vec![RuleSpec::new("z", "literal", "zzz").with_scope("field")]);
        let summary = c.ingest_unit(
            "s.jsonl",
            vec![Ok(json!({"type": "response_item", "timestamp": "2025-01-01T00:00:00Z",
                           "payload": {"type": "function_call", "arguments": {"x": 1}}}))],
        );
        assert!(summary.is_committed());
        assert_eq!(summary.errors_with(Severity::Warning).next().unwrap().code, "non_text_field");
        let row = &c.gateway().records("s.jsonl")[0];
        assert_eq!(row.payload["arguments"], json!({"x": 1}));
        assert_eq!(row.fields["function_call.arguments"], "{\"x\":1}");
    }

    #[test]
    fn test_batches_are_staged_across_batch_size() {
        let config = IngestConfig {
            batch_size: 2,
            ..IngestConfig::default()
        };
        let mut c = IngestCoordinator::new(Arc::new(CompiledRules::empty()), config, InMemoryGateway::new()).unwrap();
        let records: Vec<_> = (0..5).map(|i| prompt(&format!("p{}", i))).collect();
        let summary = c.ingest_unit("s.jsonl", records);
        assert_eq!(summary.records_persisted, 5);
        assert_eq!(c.gateway().records("s.jsonl").len(), 5);
    }

    #[test]
    fn test_malformed_first_record_is_critical() {
        let mut c = coordinator(vec![]);
        let summary = c.ingest_unit("s.jsonl", vec![Err(StreamError::Malformed("bad".into())), prompt("x")]);
        assert_eq!(summary.status, UnitStatus::RolledBack);
        assert_eq!(summary.critical().unwrap().code, "corrupt_header");
        assert_eq!(summary.records_seen, 1);
    }

    #[test]
    fn test_malformed_later_record_is_error() {
        let mut c = coordinator(vec![]);
        let summary = c.ingest_unit("s.jsonl", vec![prompt("x"), Err(StreamError::Malformed("bad".into()))]);
        assert!(summary.is_committed());
        assert_eq!(summary.errors[0].code, "malformed_record");
        assert_eq!(summary.errors[0].severity, Severity::Error);
        assert_eq!(summary.records_persisted, 1);
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let rules = Arc::new(CompiledRules::empty());
        let mut c =
            IngestCoordinator::new(rules, IngestConfig::default(), InMemoryGateway::with_failing_commit()).unwrap();
        let summary = c.ingest_unit("s.jsonl", vec![prompt("x")]);
        assert_eq!(summary.status, UnitStatus::RolledBack);
        assert_eq!(summary.critical().unwrap().code, "persistence_failure");
        assert!(!c.gateway().in_transaction());
        assert_eq!(c.gateway().record_count(), 0);
    }

    #[test]
    fn test_sanitizer_runs_before_rules() {
        let mut c = coordinator(vec![RuleSpec::new("pw", "literal", "[redacted]").with_replacement("<PW>")]);
        let summary = c.ingest_unit(
            "s.jsonl",
            vec![Ok(json!({"type": "event_msg", "timestamp": "2025-01-01T00:00:00Z",
                           "payload": {"type": "user_message", "message": "Bearer abcdefghijklmnopqrstuvwxyz"}}))],
        );
        assert_eq!(summary.count("sanitized_values"), 1);
        assert_eq!(c.gateway().records("s.jsonl")[0].fields["prompt.message"], "<PW>");
    }
}
