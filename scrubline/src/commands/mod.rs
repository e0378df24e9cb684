// scrubline/src/commands/mod.rs
//! Subcommand implementations.

pub mod export;
pub mod ingest;
pub mod redactions;
pub mod rules;

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scrubline_core::{CompiledRules, IngestConfig, RuleSet};

use crate::store::{SqliteGateway, default_db_path};

/// The rule file at `path`, or the built-in rules.
pub fn load_rule_set(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => RuleSet::load_from_file(path),
        None => RuleSet::load_default_rules(),
    }
}

/// Loads and compiles the rules a pipeline run uses. `no_redact` yields an
/// empty set.
pub fn build_rules(path: Option<&Path>, disable: &[String], no_redact: bool) -> Result<Arc<CompiledRules>> {
    if no_redact {
        debug!("--no-redact given; using an empty rule set");
        return Ok(Arc::new(CompiledRules::empty()));
    }
    let mut rule_set = load_rule_set(path)?;
    if !disable.is_empty() {
        rule_set.disable_rules(disable);
    }
    let compiled = rule_set
        .compile()
        .with_context(|| format!("Rule set {} is invalid", rule_set.source))?;
    Ok(Arc::new(compiled))
}

/// The settings file at `path`, or the defaults.
pub fn load_ingest_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => IngestConfig::load_from_file(path),
        None => Ok(IngestConfig::default()),
    }
}

/// Opens `--db`, falling back to the per-user default location.
pub fn open_database(db: Option<&PathBuf>) -> Result<SqliteGateway> {
    let path = match db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    debug!("Using database {}", path.display());
    SqliteGateway::open(&path)
}
