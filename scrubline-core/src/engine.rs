// scrubline-core/src/engine.rs
//! The redaction rule engine.
//!
//! [`RedactionEngine`] is the seam the ingest coordinator drives: given one
//! [`ContentUnit`] it returns the rewritten value, per-rule counts and the
//! audit entries to stage. [`RuleEngine`] is the ordered-rule implementation.
//!
//! Application is sequential composition. Each eligible rule sees the output
//! of the rules before it, so a later rule can re-match text an earlier rule
//! inserted. Rule authors order their lists with that in mind.

use log::debug;
use std::sync::Arc;

use crate::audit::{log_rule_hit_debug, PendingApplication};
use crate::content::ContentUnit;
use crate::rules::compiler::CompiledRules;
use crate::rules::matcher::apply_rule;
use crate::rules::scope::is_eligible;
use crate::summary::RuleSummary;

/// Result of running the engine over one content unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub value: String,
    pub summary: RuleSummary,
    /// One entry per rule with a nonzero match count, in rule order.
    pub pending: Vec<PendingApplication>,
}

/// A redaction engine over content units.
///
/// Implementations must be pure: no clock reads, no I/O, the same output for
/// the same unit and rule set.
pub trait RedactionEngine: Send + Sync {
    fn apply(&self, unit: &ContentUnit<'_>) -> EngineOutput;

    /// The rule set this engine runs.
    fn compiled_rules(&self) -> &CompiledRules;
}

/// Runs an ordered, immutable rule set.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Arc<CompiledRules>,
}

impl RuleEngine {
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        Self { rules }
    }

    /// An engine with no rules. Every unit passes through unchanged.
    pub fn passthrough() -> Self {
        Self::new(Arc::new(CompiledRules::empty()))
    }

    pub fn rules(&self) -> &Arc<CompiledRules> {
        &self.rules
    }
}

impl RedactionEngine for RuleEngine {
    fn apply(&self, unit: &ContentUnit<'_>) -> EngineOutput {
        let mut current = unit.value.to_string();
        let mut summary = RuleSummary::default();
        let mut pending = Vec::new();

        for rule in self.rules.iter() {
            if !rule.enabled || !is_eligible(rule.scope, unit.class) {
                continue;
            }
            let (next, count) = apply_rule(rule, &current);
            if count == 0 {
                continue;
            }
            log_rule_hit_debug(module_path!(), &rule.id, unit.field_path, &current, count);
            current = next.into_owned();

            summary.record(&rule.id, count, &rule.replacement);
            pending.push(PendingApplication {
                scope: unit.scope.clone(),
                field_path: unit.field_path.to_string(),
                rule_id: rule.id.clone(),
                fingerprint: rule.fingerprint.clone(),
                reason: rule.reason.clone(),
                actor: rule.actor.clone(),
            });
        }

        if !pending.is_empty() {
            debug!(
                "{} {} rule(s) rewrote {} in {}",
                module_path!(),
                pending.len(),
                unit.field_path,
                unit.scope
            );
        }

        EngineOutput {
            value: current,
            summary,
            pending,
        }
    }

    fn compiled_rules(&self) -> &CompiledRules {
        &self.rules
    }
}
