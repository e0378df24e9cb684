// scrubline/src/commands/ingest.rs
//! `scrubline ingest`: run session files through the pipeline.

use anyhow::Result;
use is_terminal::IsTerminal;
use log::info;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scrubline_core::{
    CompiledRules, InMemoryGateway, IngestConfig, IngestCoordinator, IngestReport, PersistenceGateway, StreamError,
};

use crate::cli::IngestCommand;
use crate::source::{discover_sources, open_source};
use crate::ui::redaction_summary;
use crate::ui::theme::ThemeMap;

use super::{build_rules, load_ingest_config, open_database};

type RecordStream = Box<dyn Iterator<Item = Result<Value, StreamError>>>;

/// Runs the ingest command and prints its report. The report is returned so
/// the caller can pick an exit status.
pub fn run_ingest(cmd: &IngestCommand, theme: &ThemeMap) -> Result<IngestReport> {
    let rules = build_rules(cmd.rules.as_deref(), &cmd.disable_rule, cmd.no_redact)?;
    let config = build_config(cmd)?;
    let sources = collect_sources(cmd)?;
    info!("Ingesting {} file(s) with {} rule(s)", sources.len(), rules.len());

    let report = if cmd.dry_run {
        run_pipeline(rules, config, InMemoryGateway::new(), &sources)?
    } else {
        let gateway = open_database(cmd.db.as_ref())?;
        run_pipeline(rules, config, gateway, &sources)?
    };

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    if cmd.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        let supports_color = stdout.is_terminal();
        redaction_summary::print_ingest_report(&mut writer, &report, theme, supports_color)?;
    }
    Ok(report)
}

fn build_config(cmd: &IngestCommand) -> Result<IngestConfig> {
    let mut config = load_ingest_config(cmd.config.as_deref())?;
    if let Some(batch_size) = cmd.batch_size {
        config.batch_size = batch_size;
    }
    if cmd.no_sanitize {
        config.sanitizer.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn collect_sources(cmd: &IngestCommand) -> Result<Vec<PathBuf>> {
    if let Some(root) = &cmd.root {
        return Ok(discover_sources(root, cmd.limit)?);
    }
    let mut files = cmd.files.clone();
    if let Some(limit) = cmd.limit {
        files.truncate(limit);
    }
    Ok(files)
}

// A file that cannot be opened becomes a unit whose stream fails at once,
// so it is rolled back and reported like any other read failure.
fn record_stream(path: &Path) -> RecordStream {
    match open_source(path) {
        Ok(records) => Box::new(records),
        Err(e) => Box::new(std::iter::once(Err(StreamError::Io(format!("{:#}", e))))),
    }
}

fn run_pipeline<G: PersistenceGateway>(
    rules: Arc<CompiledRules>,
    config: IngestConfig,
    gateway: G,
    sources: &[PathBuf],
) -> Result<IngestReport> {
    let mut coordinator = IngestCoordinator::new(rules, config, gateway)?;
    let units = sources
        .iter()
        .map(|path| (path.display().to_string(), record_stream(path)));
    Ok(coordinator.ingest_all(units))
}
