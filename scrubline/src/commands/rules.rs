// scrubline/src/commands/rules.rs
//! `scrubline rules`: compile a rule set and list it, or edit a rule file.
//!
//! Edits are validated by compiling the edited set before anything is
//! written, so a bad rule never reaches the file.

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::info;
use serde_json::json;
use std::io::{self, Write};
use std::path::Path;

use scrubline_core::{RuleSet, RuleSpec};

use crate::cli::{RulesAction, RulesCommand};
use crate::ui::theme::ThemeMap;
use crate::ui::{output_format, redaction_summary};

use super::load_rule_set;

pub fn run_rules(cmd: &RulesCommand, theme: &ThemeMap) -> Result<()> {
    match &cmd.action {
        None => list_rules(cmd, theme),
        Some(RulesAction::Add {
            rules,
            id,
            kind,
            pattern,
            scope,
            replacement,
            reason,
            actor,
            disabled,
            case_sensitive,
            dotall,
        }) => {
            let spec = RuleSpec {
                scope: Some(scope.clone()),
                replacement: replacement.clone(),
                enabled: !disabled,
                ignore_case: !case_sensitive,
                dotall: *dotall,
                reason: reason.clone(),
                actor: actor.clone(),
                ..RuleSpec::new(id.as_str(), kind.as_str(), pattern.as_str())
            };
            add_rule(rules, spec)?;
            print_status(&format!("Added rule '{}' to {}", id, rules.display()), true, theme)
        }
        Some(RulesAction::Remove { rules, id }) => {
            let mut rule_set = RuleSet::load_from_file(rules)?;
            if !rule_set.remove_rule(id) {
                return print_status(
                    &format!("Rule '{}' not found in {}; no changes made", id, rules.display()),
                    false,
                    theme,
                );
            }
            save_validated(&rule_set, rules)?;
            print_status(&format!("Removed rule '{}' from {}", id, rules.display()), true, theme)
        }
    }
}

fn add_rule(path: &Path, spec: RuleSpec) -> Result<()> {
    let mut rule_set = if path.exists() {
        RuleSet::load_from_file(path)?
    } else {
        info!("Creating rule file {}", path.display());
        RuleSet::new(path.display().to_string(), Vec::new())
    };
    rule_set.add_rule(spec)?;
    save_validated(&rule_set, path)
}

fn save_validated(rule_set: &RuleSet, path: &Path) -> Result<()> {
    rule_set
        .compile()
        .with_context(|| format!("Refusing to write {}: the edited rule set is invalid", path.display()))?;
    rule_set
        .save_to_file(path)
        .with_context(|| format!("Failed to write rule file {}", path.display()))?;
    Ok(())
}

fn print_status(msg: &str, changed: bool, theme: &ThemeMap) -> Result<()> {
    let stderr = io::stderr();
    let supports_color = stderr.is_terminal();
    let mut writer = stderr.lock();
    if changed {
        output_format::print_success_message(&mut writer, msg, theme, supports_color)?;
    } else {
        output_format::print_warn_message(&mut writer, msg, theme, supports_color)?;
    }
    Ok(())
}

fn list_rules(cmd: &RulesCommand, theme: &ThemeMap) -> Result<()> {
    let rule_set = load_rule_set(cmd.rules.as_deref())?;
    let compiled = rule_set
        .compile()
        .with_context(|| format!("Rule set {} is invalid", rule_set.source))?;

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    if cmd.json {
        for rule in compiled.iter().filter(|r| r.enabled || cmd.include_disabled) {
            let line = json!({
                "id": rule.id,
                "kind": rule.kind.as_str(),
                "scope": rule.scope.as_str(),
                "pattern": rule.pattern,
                "replacement": rule.replacement,
                "enabled": rule.enabled,
                "fingerprint": rule.fingerprint,
            });
            writeln!(writer, "{}", line)?;
        }
        return Ok(());
    }

    let supports_color = stdout.is_terminal();
    redaction_summary::print_rules(&mut writer, &compiled, cmd.include_disabled, theme, supports_color)?;
    Ok(())
}
