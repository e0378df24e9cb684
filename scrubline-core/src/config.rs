//! Configuration management for `scrubline-core`.
//!
//! This module defines the serialized shapes the pipeline is driven by: the
//! rule source format ([`RuleSpec`], loaded as a [`RuleSet`]) and the ingest
//! settings ([`IngestConfig`]). YAML is read with `serde_yml`, JSON with
//! `serde_json`. Nothing here compiles patterns; see [`crate::rules::compiler`].
//!
//! License: MIT OR Apache-2.0

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::content::ContentClass;
use crate::errors::ScrublineError;
use crate::rules::compiler::{compile_rules, CompiledRules};

/// Replacement text used when a rule does not name one.
pub const DEFAULT_REPLACEMENT: &str = "<REDACTED>";

/// Placeholder the heuristic sanitizer substitutes for secrets.
pub const DEFAULT_SANITIZER_PLACEHOLDER: &str = "[redacted]";

fn default_true() -> bool {
    true
}

/// One entry of a rule file, exactly as authored.
///
/// Required fields are optional here so that a missing field is reported by
/// the compiler with the rule's position instead of a generic parse error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `regex`, `marker` or `literal`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// `prompt` (default), `field` or `global`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub ignore_case: bool,
    #[serde(default)]
    pub dotall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            id: None,
            kind: None,
            pattern: None,
            scope: None,
            replacement: None,
            enabled: true,
            ignore_case: true,
            dotall: false,
            reason: None,
            actor: None,
        }
    }
}

impl RuleSpec {
    /// Convenience constructor for the common case of an enabled rule.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(kind.into()),
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = Some(replacement.into());
        self
    }
}

#[derive(Deserialize)]
struct WrappedRules {
    rules: Vec<RuleSpec>,
}

/// An ordered list of rule specifications plus the name of where it came from.
///
/// Order is significant: rules are applied in the order they appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub source: String,
    pub rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn new(source: impl Into<String>, rules: Vec<RuleSpec>) -> Self {
        Self {
            source: source.into(),
            rules,
        }
    }

    /// Loads a rule set from a YAML (`.yml`/`.yaml`) or JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading redaction rules from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let source = path.display().to_string();

        let set = if is_yaml_path(path) {
            Self::from_yaml_str(&source, &text)?
        } else {
            Self::from_json_str(&source, &text)?
        };
        info!("Loaded {} rules from {}.", set.rules.len(), path.display());
        Ok(set)
    }

    /// Writes the set back as a plain list of rules, YAML for `.yml`/`.yaml`
    /// paths and pretty JSON otherwise.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScrublineError> {
        let path = path.as_ref();
        let text = if is_yaml_path(path) {
            serde_yml::to_string(&self.rules).map_err(|e| ScrublineError::SerializationError(e.to_string()))?
        } else {
            let mut json = serde_json::to_string_pretty(&self.rules)
                .map_err(|e| ScrublineError::SerializationError(e.to_string()))?;
            json.push('\n');
            json
        };
        std::fs::write(path, text)?;
        info!("Saved {} rules to {}.", self.rules.len(), path.display());
        Ok(())
    }

    /// Parses a YAML document holding either a list of rules or a `rules:` mapping.
    pub fn from_yaml_str(source: &str, text: &str) -> Result<Self, ScrublineError> {
        let rules = parse_rule_document(source, text, |t| serde_yml::from_str::<Vec<RuleSpec>>(t), |t| {
            serde_yml::from_str::<WrappedRules>(t)
        })?;
        Ok(Self::new(source, rules))
    }

    /// Parses a JSON document holding either a list of rules or a `rules` object.
    pub fn from_json_str(source: &str, text: &str) -> Result<Self, ScrublineError> {
        let rules = parse_rule_document(source, text, |t| serde_json::from_str::<Vec<RuleSpec>>(t), |t| {
            serde_json::from_str::<WrappedRules>(t)
        })?;
        Ok(Self::new(source, rules))
    }

    /// Loads the built-in rule set.
    pub fn load_default_rules() -> Result<Self> {
        debug!("Loading default rules from embedded string...");
        let default_yaml = include_str!("../config/default_rules.yaml");
        let set = Self::from_yaml_str("<default rules>", default_yaml)
            .context("Failed to parse default rules")?;
        debug!("Loaded {} default rules.", set.rules.len());
        Ok(set)
    }

    /// Marks the named rules as disabled. Unknown ids are reported and ignored.
    pub fn disable_rules(&mut self, disable: &[String]) {
        let disable_set: HashSet<&str> = disable.iter().map(String::as_str).collect();
        let known: HashSet<&str> = self.rules.iter().filter_map(|r| r.id.as_deref()).collect();

        for id in disable_set.difference(&known) {
            warn!("Rule '{}' in the disable list does not exist.", id);
        }

        for rule in &mut self.rules {
            if rule.id.as_deref().is_some_and(|id| disable_set.contains(id)) {
                rule.enabled = false;
            }
        }
    }

    /// Appends `rule`. An id already present in the set is rejected and the
    /// set is left unchanged.
    pub fn add_rule(&mut self, rule: RuleSpec) -> Result<(), ScrublineError> {
        if let Some(id) = rule.id.as_deref() {
            if self.rules.iter().any(|r| r.id.as_deref() == Some(id)) {
                return Err(ScrublineError::DuplicateRuleId(id.to_string()));
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Removes the rule with `id`. Returns `false` if there was none.
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id.as_deref() != Some(id));
        self.rules.len() != before
    }

    /// Validates and compiles the set. Fails on the first invalid rule.
    pub fn compile(&self) -> Result<CompiledRules, ScrublineError> {
        compile_rules(&self.rules)
    }
}

fn is_yaml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
        .unwrap_or(false)
}

fn parse_rule_document<E1, E2>(
    source: &str,
    text: &str,
    as_list: impl Fn(&str) -> Result<Vec<RuleSpec>, E1>,
    as_wrapped: impl Fn(&str) -> Result<WrappedRules, E2>,
) -> Result<Vec<RuleSpec>, ScrublineError>
where
    E1: std::fmt::Display,
{
    match as_list(text) {
        Ok(rules) => Ok(rules),
        Err(list_err) => match as_wrapped(text) {
            Ok(wrapped) => Ok(wrapped.rules),
            Err(_) => Err(ScrublineError::Parse {
                source_name: source.to_string(),
                message: format!("expected a list of rules: {}", list_err),
            }),
        },
    }
}

/// Identifies the record that opens a new prompt group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptAnchor {
    pub record_type: String,
    pub payload_type: String,
}

impl Default for PromptAnchor {
    fn default() -> Self {
        Self {
            record_type: "event_msg".to_string(),
            payload_type: "user_message".to_string(),
        }
    }
}

/// Maps a text field inside a record's payload to an audited field path.
///
/// `pointer` is a JSON pointer relative to the payload; a `*` segment visits
/// every element of an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldTarget {
    pub record_type: String,
    #[serde(default)]
    pub payload_type: Option<String>,
    pub pointer: String,
    pub field_path: String,
    #[serde(default = "default_field_class")]
    pub class: ContentClass,
}

fn default_field_class() -> ContentClass {
    ContentClass::FieldAtPath
}

impl FieldTarget {
    pub fn new(
        record_type: &str,
        payload_type: Option<&str>,
        pointer: &str,
        field_path: &str,
        class: ContentClass,
    ) -> Self {
        Self {
            record_type: record_type.to_string(),
            payload_type: payload_type.map(str::to_string),
            pointer: pointer.to_string(),
            field_path: field_path.to_string(),
            class,
        }
    }

    pub fn applies_to(&self, record_type: &str, payload_type: Option<&str>) -> bool {
        self.record_type == record_type
            && match self.payload_type.as_deref() {
                Some(expected) => payload_type == Some(expected),
                None => true,
            }
    }
}

/// The field layout of Codex-style session logs.
pub fn default_field_targets() -> Vec<FieldTarget> {
    use ContentClass::{FieldAtPath, PromptBody};
    vec![
        FieldTarget::new("event_msg", Some("user_message"), "/message", "prompt.message", PromptBody),
        FieldTarget::new("event_msg", Some("agent_reasoning"), "/text", "agent.reasoning.text", FieldAtPath),
        FieldTarget::new("event_msg", Some("agent_message"), "/message", "agent.message", FieldAtPath),
        FieldTarget::new("response_item", Some("message"), "/content/*/text", "response.message", FieldAtPath),
        FieldTarget::new("response_item", Some("function_call"), "/arguments", "function_call.arguments", FieldAtPath),
        FieldTarget::new("response_item", Some("function_call_output"), "/output", "function_call.output", FieldAtPath),
        FieldTarget::new("turn_context", None, "/cwd", "turn_context.cwd", FieldAtPath),
    ]
}

/// Settings for the heuristic secret sanitizer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub enabled: bool,
    pub placeholder: String,
    /// Shortest token the entropy detector considers.
    pub min_token_len: usize,
    /// Bits per byte at which a token is flagged without keyword context.
    pub entropy_threshold: f64,
    /// Bytes searched before a token for credential keywords.
    pub context_window: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            placeholder: DEFAULT_SANITIZER_PLACEHOLDER.to_string(),
            min_token_len: 20,
            entropy_threshold: 4.0,
            context_window: 32,
        }
    }
}

/// Top-level ingest settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records staged per batch. The transaction still spans the whole source.
    pub batch_size: usize,
    pub prompt_anchor: PromptAnchor,
    pub fields: Vec<FieldTarget>,
    pub sanitizer: SanitizerConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            prompt_anchor: PromptAnchor::default(),
            fields: default_field_targets(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Loads ingest settings from a YAML file; absent keys keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading ingest config from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: IngestConfig = parse_yaml(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("Ingest config validation failed: 'batch_size' must be greater than 0.");
        }
        for target in &self.fields {
            if !target.pointer.starts_with('/') {
                bail!(
                    "Ingest config validation failed: pointer '{}' for field '{}' must start with '/'.",
                    target.pointer,
                    target.field_path
                );
            }
            if target.field_path.trim().is_empty() {
                bail!("Ingest config validation failed: a field target has an empty 'field_path'.");
            }
        }
        if self.sanitizer.entropy_threshold <= 0.0 {
            bail!("Ingest config validation failed: 'sanitizer.entropy_threshold' must be positive.");
        }
        Ok(())
    }
}

fn parse_yaml<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_yml::from_str(text)?)
}
