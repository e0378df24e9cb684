// scrubline-core/src/export.rs
//! Re-applying the current rule set to stored rows.
//!
//! Stored rows carry whatever the rules of their ingest run produced. An
//! export runs the configured field targets through an engine again, so rules
//! added since then take effect, and returns audit entries for every match it
//! made. Entries are keyed like ingest-time ones, so recording them twice is a
//! no-op.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::audit::RedactionApplication;
use crate::config::FieldTarget;
use crate::content::OwnerScope;
use crate::coordinator::redact_fields;
use crate::engine::RedactionEngine;
use crate::persistence::RecordRow;
use crate::summary::{ProcessingError, RuleSummary};

/// Rows ready to print plus what redacting them produced.
#[derive(Debug, Clone, Default)]
pub struct ExportOutput {
    pub rows: Vec<RecordRow>,
    pub summary: RuleSummary,
    pub applications: Vec<RedactionApplication>,
    pub warnings: Vec<ProcessingError>,
}

/// Redacts the configured fields of each row with `engine`. Row order is
/// kept. Every audit entry is stamped with `applied_at`.
pub fn export_rows(
    engine: &dyn RedactionEngine,
    targets: &[FieldTarget],
    rows: Vec<RecordRow>,
    applied_at: DateTime<Utc>,
) -> ExportOutput {
    let mut out = ExportOutput::default();
    for mut row in rows {
        let scope = OwnerScope::new(row.source_id.as_str(), row.prompt_index);
        let redaction = redact_fields(
            engine,
            targets,
            &row.record_type,
            row.payload_type.as_deref(),
            &mut row.payload,
            &scope,
        );
        for warning in redaction.warnings {
            let warning = warning.at(&row.source_id, Some(row.position));
            warn!("{}", warning);
            out.warnings.push(warning);
        }
        out.summary.merge(&redaction.rules);
        out.applications
            .extend(redaction.pending.into_iter().map(|p| p.into_application(applied_at)));
        row.fields = redaction.fields;
        out.rows.push(row);
    }
    debug!(
        "Exported {} row(s) with {} redaction(s)",
        out.rows.len(),
        out.summary.total()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_field_targets, RuleSpec};
    use crate::engine::RuleEngine;
    use crate::persistence::RowKind;
    use crate::rules::compiler::compile_rules;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn stored(position: usize, prompt_index: Option<u32>, message: &str) -> RecordRow {
        RecordRow {
            source_id: "a.jsonl".to_string(),
            position,
            prompt_index,
            kind: RowKind::Prompt,
            record_type: "event_msg".to_string(),
            payload_type: Some("user_message".to_string()),
            timestamp: None,
            fields: BTreeMap::from([("prompt.message".to_string(), message.to_string())]),
            payload: json!({"type": "user_message", "message": message}),
            metadata: json!({}),
        }
    }

    fn host_engine() -> RuleEngine {
        let rules = compile_rules(&[RuleSpec::new("host", "literal", "db01").with_replacement("<HOST>")]).unwrap();
        RuleEngine::new(Arc::new(rules))
    }

    #[test]
    fn test_export_applies_current_rules_to_stored_rows() {
        let rows = vec![stored(1, Some(1), "ssh db01 now"), stored(2, Some(2), "nothing here")];
        let at = Utc::now();
        let out = export_rows(&host_engine(), &default_field_targets(), rows, at);

        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].fields["prompt.message"], "ssh <HOST> now");
        assert_eq!(out.rows[0].payload["message"], "ssh <HOST> now");
        assert_eq!(out.rows[1].fields["prompt.message"], "nothing here");
        assert_eq!(out.summary.count("host"), 1);

        assert_eq!(out.applications.len(), 1);
        let app = &out.applications[0];
        assert_eq!(app.scope, OwnerScope::new("a.jsonl", Some(1)));
        assert_eq!(app.field_path, "prompt.message");
        assert_eq!(app.applied_at, at);
    }

    #[test]
    fn test_passthrough_export_changes_nothing() {
        let rows = vec![stored(1, Some(1), "ssh db01 now")];
        let out = export_rows(&RuleEngine::passthrough(), &default_field_targets(), rows.clone(), Utc::now());
        assert_eq!(out.rows, rows);
        assert!(out.applications.is_empty());
    }
}
