// scrubline/src/commands/redactions.rs
//! `scrubline redactions`: read and extend the audit trail.

use anyhow::Result;
use is_terminal::IsTerminal;
use log::info;
use std::io::{self, Write};

use scrubline_core::{OwnerScope, RedactionApplication, preferred_applications};

use crate::cli::RedactionsCommand;
use crate::ui::theme::ThemeMap;
use crate::ui::{output_format, redaction_summary};

use super::open_database;

pub fn run_redactions(cmd: &RedactionsCommand, theme: &ThemeMap) -> Result<()> {
    match cmd {
        RedactionsCommand::List { db, source, all, json } => {
            let gateway = open_database(db.as_ref())?;
            let stored = gateway.applications(source.as_deref())?;
            let shown: Vec<&RedactionApplication> = if *all {
                stored.iter().collect()
            } else {
                preferred_applications(&stored)
            };

            let stdout = io::stdout();
            let mut writer = stdout.lock();
            if *json {
                for app in shown {
                    writeln!(writer, "{}", serde_json::to_string(app)?)?;
                }
                return Ok(());
            }
            let supports_color = stdout.is_terminal();
            redaction_summary::print_applications(&mut writer, &shown, theme, supports_color)?;
        }
        RedactionsCommand::Add {
            db,
            source,
            prompt,
            field,
            replacement,
            reason,
            actor,
        } => {
            let mut gateway = open_database(db.as_ref())?;
            let application = RedactionApplication::manual(
                OwnerScope::new(source.as_str(), *prompt),
                field,
                replacement,
                reason.clone(),
                actor.clone(),
            );
            let inserted = gateway.record_manual(&application)?;
            info!("Manual redaction for {} {} inserted: {}", source, field, inserted);

            let stderr = io::stderr();
            let supports_color = stderr.is_terminal();
            let mut writer = stderr.lock();
            if inserted {
                output_format::print_success_message(&mut writer, &format!("Recorded manual redaction for {}", field), theme, supports_color)?;
            } else {
                output_format::print_warn_message(&mut writer, "An identical manual redaction already exists", theme, supports_color)?;
            }
        }
    }
    Ok(())
}
