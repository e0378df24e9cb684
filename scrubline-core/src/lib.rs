// scrubline-core/src/lib.rs
//! # Scrubline Core Library
//!
//! `scrubline-core` turns streams of raw structured records into normalized,
//! persisted rows while applying a deterministic, auditable, rule-driven
//! redaction engine. It owns no storage: persistence goes through the
//! [`PersistenceGateway`] contract.
//!
//! ## Modules
//!
//! * `config`: rule specifications ([`RuleSpec`], [`RuleSet`]) and ingest settings ([`IngestConfig`]).
//! * `rules`: compiler, fingerprinting, scope resolution and the single-rule matcher.
//! * `content`: content units and their owner scopes.
//! * `engine`: the [`RedactionEngine`] trait and the ordered [`RuleEngine`].
//! * `normalizer`: record validation with tiered errors.
//! * `sanitizer`: heuristic secret scrubbing, backed by `scrubline-entropy`.
//! * `audit`: redaction application records and PII-safe debug logging.
//! * `summary`: processing errors, rule summaries and run summaries.
//! * `persistence`: the gateway trait and an in-memory gateway.
//! * `coordinator`: the per-unit ingest state machine.
//! * `export`: re-applying current rules to stored rows.
//! * `errors`: load-time error types.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use scrubline_core::{IngestConfig, IngestCoordinator, InMemoryGateway, RuleSet};
//! use serde_json::json;
//!
//! fn main() -> anyhow::Result<()> {
//!     let rules = Arc::new(RuleSet::load_default_rules()?.compile()?);
//!     let mut coordinator = IngestCoordinator::new(rules, IngestConfig::default(), InMemoryGateway::new())?;
//!
//!     let records = vec![Ok(json!({
//!         "type": "event_msg",
//!         "timestamp": "2025-01-01T00:00:00Z",
//!         "payload": {"type": "user_message", "message": "mail me at alice@example.com"}
//!     }))];
//!     let summary = coordinator.ingest_unit("session.jsonl", records);
//!
//!     assert!(summary.is_committed());
//!     assert_eq!(summary.rules.count("email_address"), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Loading rules is all-or-nothing and fails with [`ScrublineError`]. Problems
//! with individual records never fail a call: they are collected as
//! [`ProcessingError`]s in the [`RunSummary`], and only a `CRITICAL` one rolls
//! the unit back.
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod audit;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod export;
pub mod normalizer;
pub mod persistence;
pub mod rules;
pub mod sanitizer;
pub mod summary;

/// Rule and ingest configuration.
pub use config::{
    default_field_targets, FieldTarget, IngestConfig, PromptAnchor, RuleSet, RuleSpec, SanitizerConfig,
    DEFAULT_REPLACEMENT, DEFAULT_SANITIZER_PLACEHOLDER,
};

pub use errors::ScrublineError;

pub use rules::compiler::{compile_rules, CompiledRule, CompiledRules, RuleKind, RuleScope};

pub use content::{ContentClass, ContentUnit, OwnerScope};

pub use engine::{EngineOutput, RedactionEngine, RuleEngine};

pub use audit::{preferred_applications, redact_sensitive, ApplicationKey, PendingApplication, RedactionApplication};

pub use summary::{
    ErrorContext, IngestReport, ProcessingError, RuleSummary, RuleTally, RunSummary, Severity, UnitStatus,
};

pub use persistence::{FailurePoint, InMemoryGateway, PersistenceGateway, RecordRow, RowKind};

pub use coordinator::{redact_fields, FieldRedaction, IngestCoordinator, StreamError};

pub use export::{export_rows, ExportOutput};

pub use sanitizer::Sanitizer;
