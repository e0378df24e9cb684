// scrubline-core/src/audit.rs
//! Redaction audit records and PII-safe debug logging.
//!
//! A [`RedactionApplication`] records that a rule (or a person) redacted a
//! field of some owner scope. Applications are append-only and unique per
//! [`ApplicationKey`]; the persistence layer inserts them if absent.
//!
//! Matched text never reaches the logs verbatim unless
//! `SCRUBLINE_ALLOW_DEBUG_PII=true` is set in the environment.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::content::OwnerScope;

lazy_static! {
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("SCRUBLINE_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

const MANUAL_FINGERPRINT_DOMAIN: &[u8] = b"scrubline-manual-redaction-v1\0";

/// A rule match the engine wants recorded. Carries no timestamp; the
/// coordinator stamps it when it becomes a [`RedactionApplication`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApplication {
    pub scope: OwnerScope,
    pub field_path: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

impl PendingApplication {
    pub fn into_application(self, applied_at: DateTime<Utc>) -> RedactionApplication {
        RedactionApplication {
            scope: self.scope,
            rule_id: Some(self.rule_id),
            fingerprint: self.fingerprint,
            field_path: self.field_path,
            reason: self.reason,
            actor: self.actor,
            applied_at,
        }
    }
}

/// A durable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionApplication {
    pub scope: OwnerScope,
    /// `None` for a manual redaction.
    pub rule_id: Option<String>,
    pub fingerprint: String,
    pub field_path: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// Uniqueness key of an application: owner scope, field path, rule id and
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationKey {
    pub scope: OwnerScope,
    pub field_path: String,
    pub rule_id: Option<String>,
    pub fingerprint: String,
}

impl RedactionApplication {
    /// Builds a manual redaction. Its fingerprint is derived from the field
    /// path and replacement text so that repeating the same manual edit
    /// conflicts instead of duplicating.
    pub fn manual(
        scope: OwnerScope,
        field_path: &str,
        replacement: &str,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(MANUAL_FINGERPRINT_DOMAIN);
        hasher.update(field_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(replacement.as_bytes());
        Self {
            scope,
            rule_id: None,
            fingerprint: hex::encode(hasher.finalize()),
            field_path: field_path.to_string(),
            reason,
            actor,
            applied_at: Utc::now(),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.rule_id.is_none()
    }

    pub fn key(&self) -> ApplicationKey {
        ApplicationKey {
            scope: self.scope.clone(),
            field_path: self.field_path.clone(),
            rule_id: self.rule_id.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Read-time precedence: for each (owner scope, field path) the manual rows
/// win when any exist, otherwise the rule rows are returned. Input order is
/// kept within each group.
pub fn preferred_applications(applications: &[RedactionApplication]) -> Vec<&RedactionApplication> {
    let manual_targets: BTreeSet<(&OwnerScope, &str)> = applications
        .iter()
        .filter(|a| a.is_manual())
        .map(|a| (&a.scope, a.field_path.as_str()))
        .collect();

    applications
        .iter()
        .filter(|a| a.is_manual() || !manual_targets.contains(&(&a.scope, a.field_path.as_str())))
        .collect()
}

/// Masks a sensitive string for logging.
pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    let chars = s.chars().count();
    if chars <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", chars)
    }
}

fn loggable(sensitive: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        sensitive.to_string()
    } else {
        redact_sensitive(sensitive)
    }
}

/// Logs a rule hit on a field. `before` is masked unless PII debugging is on.
pub fn log_rule_hit_debug(module_path: &str, rule_id: &str, field_path: &str, before: &str, count: usize) {
    debug!(
        "{} rule '{}' matched {} time(s) in '{}': original='{}'",
        module_path,
        rule_id,
        count,
        field_path,
        loggable(before)
    );
}

/// Logs a sanitizer replacement. The replaced text is masked unless PII
/// debugging is on.
pub fn log_sanitized_debug(module_path: &str, reason: &str, original: &str) {
    debug!("{} sanitized ({}): '{}'", module_path, reason, loggable(original));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_row(scope: &OwnerScope, field: &str, rule: &str) -> RedactionApplication {
        PendingApplication {
            scope: scope.clone(),
            field_path: field.to_string(),
            rule_id: rule.to_string(),
            fingerprint: format!("fp-{}", rule),
            reason: None,
            actor: None,
        }
        .into_application(Utc::now())
    }

    #[test]
    fn test_redact_sensitive_short_string() {
        assert_eq!(redact_sensitive("abc"), "[REDACTED]");
    }

    #[test]
    fn test_redact_sensitive_long_string() {
        assert_eq!(redact_sensitive("123456789"), "[REDACTED: 9 chars]");
    }

    #[test]
    fn test_manual_fingerprint_is_stable() {
        let scope = OwnerScope::new("a.jsonl", Some(1));
        let first = RedactionApplication::manual(scope.clone(), "prompt.message", "<X>", None, None);
        let second =
            RedactionApplication::manual(scope.clone(), "prompt.message", "<X>", Some("gdpr".into()), None);
        let other = RedactionApplication::manual(scope, "prompt.message", "<Y>", None, None);
        assert!(first.is_manual());
        assert_eq!(first.key(), second.key());
        assert_ne!(first.fingerprint, other.fingerprint);
    }

    #[test]
    fn test_manual_rows_win_per_scope_and_field() {
        let p1 = OwnerScope::new("a.jsonl", Some(1));
        let p2 = OwnerScope::new("a.jsonl", Some(2));
        let rows = vec![
            rule_row(&p1, "prompt.message", "email"),
            rule_row(&p1, "agent.message", "email"),
            RedactionApplication::manual(p1.clone(), "prompt.message", "<X>", None, Some("ops".into())),
            rule_row(&p2, "prompt.message", "email"),
        ];

        let preferred = preferred_applications(&rows);
        assert_eq!(preferred.len(), 3);
        assert!(preferred.iter().any(|a| a.is_manual() && a.scope == p1));
        assert!(preferred.iter().any(|a| a.field_path == "agent.message"));
        assert!(preferred.iter().any(|a| a.scope == p2 && !a.is_manual()));
        assert!(!preferred
            .iter()
            .any(|a| a.scope == p1 && a.field_path == "prompt.message" && !a.is_manual()));
    }
}
