// scrubline/src/commands/export.rs
//! `scrubline export`: print a stored source with the current rules applied.
//!
//! Rows go to stdout as JSON lines; the summary goes to stderr so the output
//! stays machine-readable.

use anyhow::{Result, bail};
use chrono::Utc;
use is_terminal::IsTerminal;
use log::info;
use std::io::{self, Write};

use scrubline_core::{RuleEngine, export_rows};

use crate::cli::ExportCommand;
use crate::ui::output_format;
use crate::ui::theme::ThemeMap;

use super::{build_rules, load_ingest_config, open_database};

pub fn run_export(cmd: &ExportCommand, theme: &ThemeMap) -> Result<()> {
    let rules = build_rules(cmd.rules.as_deref(), &cmd.disable_rule, cmd.no_redact)?;
    let config = load_ingest_config(cmd.config.as_deref())?;
    let mut gateway = open_database(cmd.db.as_ref())?;

    let stored = gateway.stored_rows(&cmd.source)?;
    if stored.is_empty() {
        bail!("No stored rows for source '{}'; ingest it first", cmd.source);
    }
    let ingested_at = gateway.ingested_at(&cmd.source)?;
    info!("Exporting {} row(s) of {} with {} rule(s)", stored.len(), cmd.source, rules.len());

    let engine = RuleEngine::new(rules);
    let output = export_rows(&engine, &config.fields, stored, Utc::now());

    {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        for row in &output.rows {
            writeln!(writer, "{}", serde_json::to_string(row)?)?;
        }
        writer.flush()?;
    }

    let recorded = if cmd.no_record {
        0
    } else {
        gateway.record_applications(&output.applications)?
    };

    let stderr = io::stderr();
    let supports_color = stderr.is_terminal();
    let mut writer = stderr.lock();
    let summary = format!(
        "Exported {} row(s) of {} (ingested {}); {} redaction(s) applied, {} new audit row(s)",
        output.rows.len(),
        cmd.source,
        ingested_at.as_deref().unwrap_or("at an unknown time"),
        output.summary.total(),
        recorded,
    );
    output_format::print_info_message(&mut writer, &summary, theme, supports_color)?;
    Ok(())
}
