// scrubline-core/src/rules/fingerprint.rs
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::ScrublineError;
use crate::rules::compiler::{RuleKind, RuleScope};

// Domain separation for rule fingerprints. Bump the suffix if the hashed
// fields ever change, since every stored audit row refers to these values.
const FINGERPRINT_DOMAIN: &[u8] = b"scrubline-rule-fingerprint-v1\0";

/// The behavioral fields of a rule. Provenance (reason, actor) and the enabled
/// flag are deliberately absent.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    kind: &'a str,
    pattern: &'a str,
    scope: &'a str,
    replacement: &'a str,
    ignore_case: bool,
    dotall: bool,
}

/// Computes the hex SHA-256 fingerprint of a rule's behavior.
pub fn rule_fingerprint(
    kind: RuleKind,
    pattern: &str,
    scope: RuleScope,
    replacement: &str,
    ignore_case: bool,
    dotall: bool,
) -> Result<String, ScrublineError> {
    let input = FingerprintInput {
        kind: kind.as_str(),
        pattern,
        scope: scope.as_str(),
        replacement,
        ignore_case,
        dotall,
    };
    let canonical =
        serde_json::to_vec(&input).map_err(|e| ScrublineError::SerializationError(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSpec;
    use crate::rules::compiler::compile_rules;

    fn fp(spec: RuleSpec) -> String {
        compile_rules(&[spec]).unwrap().rules[0].fingerprint.clone()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fp(RuleSpec::new("a", "regex", "secret"));
        let b = fp(RuleSpec::new("a", "regex", "secret"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_id_and_provenance() {
        let mut with_provenance = RuleSpec::new("renamed", "regex", "secret");
        with_provenance.reason = Some("compliance".to_string());
        with_provenance.actor = Some("bob".to_string());
        with_provenance.enabled = false;
        assert_eq!(fp(RuleSpec::new("a", "regex", "secret")), fp(with_provenance));
    }

    #[test]
    fn test_fingerprint_tracks_behavior() {
        let base = fp(RuleSpec::new("a", "regex", "secret"));
        assert_ne!(base, fp(RuleSpec::new("a", "regex", "secrets")));
        assert_ne!(base, fp(RuleSpec::new("a", "literal", "secret")));
        assert_ne!(base, fp(RuleSpec::new("a", "regex", "secret").with_scope("global")));
        assert_ne!(base, fp(RuleSpec::new("a", "regex", "secret").with_replacement("***")));

        let mut case_sensitive = RuleSpec::new("a", "regex", "secret");
        case_sensitive.ignore_case = false;
        assert_ne!(base, fp(case_sensitive));

        let mut dotall = RuleSpec::new("a", "regex", "secret");
        dotall.dotall = true;
        assert_ne!(base, fp(dotall));
    }

    #[test]
    fn test_explicit_default_replacement_matches_implicit() {
        let implicit = fp(RuleSpec::new("a", "regex", "secret"));
        let explicit = fp(RuleSpec::new("a", "regex", "secret").with_replacement("<REDACTED>"));
        assert_eq!(implicit, explicit);
    }
}
