// scrubline/src/ui/redaction_summary.rs
//! Tables for ingest reports, rule listings and audit records.

use comfy_table::{Cell, Table, presets::UTF8_FULL};
use owo_colors::OwoColorize;
use std::io::{self, Write};

use scrubline_core::{CompiledRules, IngestReport, RedactionApplication, RuleSummary, Severity};

use super::theme::{ThemeEntry, ThemeMap, color_for};

fn print_heading<W: Write>(writer: &mut W, title: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    if supports_color {
        writeln!(writer, "\n{}", title.color(color_for(theme, ThemeEntry::Header)).bold())
    } else {
        writeln!(writer, "\n{}", title)
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

/// Per-unit outcome table, the errors of every unit and the rule totals.
pub fn print_ingest_report<W: Write>(
    writer: &mut W,
    report: &IngestReport,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    print_heading(writer, "Ingest Summary", theme, supports_color)?;
    let mut table = new_table(vec![
        "Source", "Status", "Seen", "Persisted", "Prompts", "Audit rows", "Warnings", "Errors",
    ]);
    for unit in &report.units {
        let status = if unit.is_committed() { "committed" } else { "rolled back" };
        table.add_row(vec![
            Cell::new(&unit.source_id),
            Cell::new(status),
            Cell::new(unit.records_seen),
            Cell::new(unit.records_persisted),
            Cell::new(unit.prompts),
            Cell::new(unit.applications_recorded),
            Cell::new(unit.errors_with(Severity::Warning).count()),
            Cell::new(unit.errors_with(Severity::Error).count() + unit.errors_with(Severity::Critical).count()),
        ]);
    }
    writeln!(writer, "{}", table)?;

    let problems: Vec<_> = report
        .units
        .iter()
        .flat_map(|u| u.errors.iter())
        .filter(|e| e.severity > Severity::Warning)
        .collect();
    if !problems.is_empty() {
        print_heading(writer, "Problems", theme, supports_color)?;
        for problem in problems {
            let entry = if problem.severity == Severity::Critical { ThemeEntry::Error } else { ThemeEntry::Warn };
            if supports_color {
                writeln!(writer, "  {}", problem.to_string().color(color_for(theme, entry)))?;
            } else {
                writeln!(writer, "  {}", problem)?;
            }
        }
    }

    print_rule_totals(writer, &report.rule_totals(), theme, supports_color)?;

    writeln!(
        writer,
        "\n{} file(s) committed, {} rolled back, {} record(s) persisted.",
        report.committed(),
        report.rolled_back(),
        report.records_persisted()
    )
}

fn print_rule_totals<W: Write>(
    writer: &mut W,
    totals: &RuleSummary,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    print_heading(writer, "Redaction Rules", theme, supports_color)?;
    if totals.is_empty() {
        return writeln!(writer, "No redactions applied.");
    }
    let mut table = new_table(vec!["Rule", "Hits", "Replacement"]);
    for (rule_id, tally) in &totals.rules {
        table.add_row(vec![Cell::new(rule_id), Cell::new(tally.count), Cell::new(&tally.replacement)]);
    }
    writeln!(writer, "{}", table)
}

/// One row per compiled rule, in application order.
pub fn print_rules<W: Write>(
    writer: &mut W,
    rules: &CompiledRules,
    include_disabled: bool,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    print_heading(writer, "Rules (application order)", theme, supports_color)?;
    let mut table = new_table(vec!["#", "Id", "Kind", "Scope", "Enabled", "Replacement", "Fingerprint"]);
    for (index, rule) in rules.iter().enumerate() {
        if !rule.enabled && !include_disabled {
            continue;
        }
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&rule.id),
            Cell::new(&rule.kind),
            Cell::new(&rule.scope),
            Cell::new(if rule.enabled { "yes" } else { "no" }),
            Cell::new(&rule.replacement),
            Cell::new(&rule.fingerprint[..12.min(rule.fingerprint.len())]),
        ]);
    }
    writeln!(writer, "{}", table)
}

/// Audit rows as a table; manual entries show `manual` as their rule.
pub fn print_applications<W: Write>(
    writer: &mut W,
    applications: &[&RedactionApplication],
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    print_heading(writer, "Redactions", theme, supports_color)?;
    if applications.is_empty() {
        return writeln!(writer, "No redactions recorded.");
    }
    let mut table = new_table(vec!["Source", "Prompt", "Field", "Rule", "Reason", "Actor", "Applied at"]);
    for app in applications {
        table.add_row(vec![
            Cell::new(&app.scope.source_id),
            Cell::new(app.scope.prompt_index.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(&app.field_path),
            Cell::new(app.rule_id.as_deref().unwrap_or("manual")),
            Cell::new(app.reason.as_deref().unwrap_or("")),
            Cell::new(app.actor.as_deref().unwrap_or("")),
            Cell::new(app.applied_at.to_rfc3339()),
        ]);
    }
    writeln!(writer, "{}", table)
}
