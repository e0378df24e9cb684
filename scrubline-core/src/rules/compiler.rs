//! compiler.rs - Validates rule specifications and compiles them into matchers.
//!
//! Loading is all-or-nothing: the first missing field, unknown enum value,
//! duplicate id or bad pattern rejects the whole set. The resulting
//! [`CompiledRules`] is immutable; reloading means compiling a new set and
//! swapping the `Arc` that holds it.
//!
//! License: MIT OR APACHE 2.0

use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::{RuleSpec, DEFAULT_REPLACEMENT};
use crate::errors::ScrublineError;
use crate::rules::fingerprint::rule_fingerprint;

/// Name of the capture group every marker rule must declare.
pub const MARKER_CONTENT_GROUP: &str = "content";

/// Text scanned for zero-width matches such as `\b` or `(?m)^`, which never
/// match an empty haystack.
const EMPTY_MATCH_SAMPLE: &str = "ab 12\n_-.";

/// Upper bound on the compiled program size of a single rule.
const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Regex,
    Marker,
    Literal,
}

impl RuleKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "regex" => Some(Self::Regex),
            "marker" => Some(Self::Marker),
            "literal" => Some(Self::Literal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Marker => "marker",
            Self::Literal => "literal",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Prompt,
    Field,
    Global,
}

impl RuleScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prompt" => Some(Self::Prompt),
            "field" => Some(Self::Field),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Field => "field",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, compiled redaction rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub kind: RuleKind,
    pub scope: RuleScope,
    /// The pattern as authored (unescaped for literal rules).
    pub pattern: String,
    pub regex: Regex,
    /// Effective replacement text.
    pub replacement: String,
    pub enabled: bool,
    pub ignore_case: bool,
    pub dotall: bool,
    pub reason: Option<String>,
    pub actor: Option<String>,
    /// Hash of the behavioral fields; identifies this version of the rule.
    pub fingerprint: String,
}

/// The ordered, immutable result of compiling a rule set.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub rules: Vec<CompiledRule>,
}

impl CompiledRules {
    /// A set with no rules; redaction becomes a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompiledRule> {
        self.rules.iter()
    }

    pub fn get(&self, id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }
}

/// Compiles `specs` in order. Ids are checked for presence and uniqueness
/// before any pattern is compiled.
pub fn compile_rules(specs: &[RuleSpec]) -> Result<CompiledRules, ScrublineError> {
    debug!("Starting compilation of {} rules.", specs.len());

    let mut seen = HashSet::new();
    for (index, spec) in specs.iter().enumerate() {
        let id = required(index, "id", spec.id.as_deref())?;
        if !seen.insert(id) {
            return Err(ScrublineError::DuplicateRuleId(id.to_string()));
        }
    }

    let rules = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| compile_rule(index, spec))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Finished compiling rules. Total compiled: {}.", rules.len());
    Ok(CompiledRules { rules })
}

/// Validates and compiles a single rule. `index` is its position in the file.
pub fn compile_rule(index: usize, spec: &RuleSpec) -> Result<CompiledRule, ScrublineError> {
    let id = required(index, "id", spec.id.as_deref())?.to_string();
    let kind_text = required(index, "type", spec.kind.as_deref())?;
    let pattern = spec
        .pattern
        .as_deref()
        .ok_or(ScrublineError::MissingField { index, field: "pattern" })?;
    if pattern.trim().is_empty() {
        return Err(ScrublineError::EmptyPattern(id));
    }

    let kind = RuleKind::parse(kind_text).ok_or_else(|| ScrublineError::UnknownKind {
        id: id.clone(),
        value: kind_text.to_string(),
    })?;
    let scope_text = spec.scope.as_deref().unwrap_or("prompt");
    let scope = RuleScope::parse(scope_text).ok_or_else(|| ScrublineError::UnknownScope {
        id: id.clone(),
        value: scope_text.to_string(),
    })?;

    let source = match kind {
        RuleKind::Literal => regex::escape(pattern),
        RuleKind::Regex | RuleKind::Marker => pattern.to_string(),
    };
    debug!("Attempting to compile rule '{}' ({}) with pattern {:?}", id, kind, pattern);

    let regex = RegexBuilder::new(&source)
        .case_insensitive(spec.ignore_case)
        .dot_matches_new_line(spec.dotall)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ScrublineError::RuleCompilationError(id.clone(), e))?;

    if regex.is_match("") || regex.find_iter(EMPTY_MATCH_SAMPLE).any(|m| m.is_empty()) {
        return Err(ScrublineError::EmptyMatch(id));
    }

    if kind == RuleKind::Marker
        && !regex.capture_names().flatten().any(|name| name == MARKER_CONTENT_GROUP)
    {
        return Err(ScrublineError::MarkerWithoutContentGroup(id));
    }

    let replacement = match spec.replacement.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => DEFAULT_REPLACEMENT.to_string(),
    };
    let fingerprint = rule_fingerprint(kind, pattern, scope, &replacement, spec.ignore_case, spec.dotall)?;

    log::debug!(
        target: "scrubline_core::compiler",
        "Rule '{}' compiled successfully (fingerprint {}).",
        id,
        &fingerprint[..12]
    );

    Ok(CompiledRule {
        id,
        kind,
        scope,
        pattern: pattern.to_string(),
        regex,
        replacement,
        enabled: spec.enabled,
        ignore_case: spec.ignore_case,
        dotall: spec.dotall,
        reason: normalize_optional(spec.reason.as_deref()),
        actor: normalize_optional(spec.actor.as_deref()),
        fingerprint,
    })
}

fn required<'a>(index: usize, field: &'static str, value: Option<&'a str>) -> Result<&'a str, ScrublineError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ScrublineError::MissingField { index, field }),
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_rejects_whole_set() {
        let specs = vec![
            RuleSpec::new("dup", "regex", "a"),
            RuleSpec::new("ok", "regex", "b"),
            RuleSpec::new("dup", "literal", "c"),
        ];
        let err = compile_rules(&specs).unwrap_err();
        assert!(matches!(err, ScrublineError::DuplicateRuleId(ref id) if id == "dup"));
    }

    #[test]
    fn test_invalid_pattern_rejects_whole_set() {
        let specs = vec![RuleSpec::new("good", "regex", "a+"), RuleSpec::new("bad", "regex", "(unclosed")];
        let err = compile_rules(&specs).unwrap_err();
        assert!(matches!(err, ScrublineError::RuleCompilationError(ref id, _) if id == "bad"));
    }

    #[test]
    fn test_missing_fields() {
        let mut spec = RuleSpec::new("x", "regex", "a");
        spec.kind = None;
        assert!(matches!(
            compile_rules(&[spec]).unwrap_err(),
            ScrublineError::MissingField { index: 0, field: "type" }
        ));

        let mut spec = RuleSpec::new("x", "regex", "a");
        spec.id = Some("   ".to_string());
        assert!(matches!(
            compile_rules(&[spec]).unwrap_err(),
            ScrublineError::MissingField { field: "id", .. }
        ));

        let mut spec = RuleSpec::new("x", "regex", "a");
        spec.pattern = None;
        assert!(matches!(
            compile_rules(&[spec]).unwrap_err(),
            ScrublineError::MissingField { field: "pattern", .. }
        ));
    }

    #[test]
    fn test_blank_pattern_is_rejected() {
        let err = compile_rules(&[RuleSpec::new("blank", "regex", "  ")]).unwrap_err();
        assert!(matches!(err, ScrublineError::EmptyPattern(_)));
    }

    #[test]
    fn test_patterns_matching_empty_text_are_rejected() {
        for pattern in ["a*", "x?", "(?:)", r"\b", "(?m)^", "$", "foo|"] {
            let err = compile_rules(&[RuleSpec::new("empty", "regex", pattern)]).unwrap_err();
            assert!(
                matches!(err, ScrublineError::EmptyMatch(ref id) if id == "empty"),
                "{:?} was accepted",
                pattern
            );
        }
        let err = compile_rules(&[RuleSpec::new("m", "marker", r"(?P<content>x*)")]).unwrap_err();
        assert!(matches!(err, ScrublineError::EmptyMatch(_)));

        assert!(compile_rules(&[RuleSpec::new("ok", "regex", r"a+\b")]).is_ok());
    }

    #[test]
    fn test_unknown_enums() {
        let err = compile_rules(&[RuleSpec::new("x", "glob", "a")]).unwrap_err();
        assert!(matches!(err, ScrublineError::UnknownKind { .. }));

        let err = compile_rules(&[RuleSpec::new("x", "regex", "a").with_scope("response")]).unwrap_err();
        assert!(matches!(err, ScrublineError::UnknownScope { .. }));
    }

    #[test]
    fn test_kind_is_case_insensitive() {
        let compiled = compile_rules(&[RuleSpec::new("x", "Literal", "a")]).unwrap();
        assert_eq!(compiled.rules[0].kind, RuleKind::Literal);
    }

    #[test]
    fn test_marker_requires_content_group() {
        let err = compile_rules(&[RuleSpec::new("m", "marker", r"\[redact .+?\]")]).unwrap_err();
        assert!(matches!(err, ScrublineError::MarkerWithoutContentGroup(_)));

        let ok = compile_rules(&[RuleSpec::new("m", "marker", r"\[redact\s+(?P<content>.+?)\]")]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_defaults_applied() {
        let compiled = compile_rules(&[RuleSpec::new("x", "regex", "a")]).unwrap();
        let rule = &compiled.rules[0];
        assert_eq!(rule.scope, RuleScope::Prompt);
        assert_eq!(rule.replacement, DEFAULT_REPLACEMENT);
        assert!(rule.enabled);
        assert!(rule.regex.is_match("A"));
    }

    #[test]
    fn test_empty_replacement_falls_back_to_default() {
        let compiled = compile_rules(&[RuleSpec::new("x", "regex", "a").with_replacement("")]).unwrap();
        assert_eq!(compiled.rules[0].replacement, DEFAULT_REPLACEMENT);
    }

    #[test]
    fn test_order_is_preserved() {
        let specs = vec![
            RuleSpec::new("c", "regex", "c"),
            RuleSpec::new("a", "regex", "a"),
            RuleSpec::new("b", "regex", "b"),
        ];
        let compiled = compile_rules(&specs).unwrap();
        let ids: Vec<&str> = compiled.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_provenance_is_trimmed() {
        let mut spec = RuleSpec::new("x", "regex", "a");
        spec.reason = Some("  ".to_string());
        spec.actor = Some(" alice ".to_string());
        let compiled = compile_rules(&[spec]).unwrap();
        assert_eq!(compiled.rules[0].reason, None);
        assert_eq!(compiled.rules[0].actor.as_deref(), Some("alice"));
    }
}
