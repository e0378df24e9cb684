// scrubline/src/cli.rs
//! Command-line interface definition for the scrubline application.
//! License: MIT OR Apache-2.0

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "scrubline",
    version = env!("CARGO_PKG_VERSION"),
    about = "Ingest JSONL session logs with rule-driven, auditable redaction",
    long_about = "Scrubline reads JSONL session logs, validates and sanitizes every record, applies an ordered set of redaction rules to the configured text fields and stores the result in SQLite, one transaction per file. Every rule hit is recorded in an append-only audit table.",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Suppress all informational and debug messages.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG).
    #[arg(long, short = 'd', global = true, conflicts_with = "quiet")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingests JSONL files into the database.
    Ingest(IngestCommand),

    /// Prints a stored source as JSON lines with the current rules applied.
    Export(ExportCommand),

    /// Lists a rule set, or adds and removes rules in a rule file.
    Rules(RulesCommand),

    /// Lists or adds audit records.
    #[command(subcommand)]
    Redactions(RedactionsCommand),
}

/// Arguments for the `ingest` command.
#[derive(Parser, Debug)]
pub struct IngestCommand {
    /// Files to ingest, in order.
    #[arg(value_name = "FILE", required_unless_present = "root")]
    pub files: Vec<PathBuf>,

    /// Ingest every *.jsonl file below this directory, in name order.
    #[arg(long, value_name = "DIR", conflicts_with = "files")]
    pub root: Option<PathBuf>,

    /// Stop after this many files.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// SQLite database to write (defaults to the user data directory).
    #[arg(long, value_name = "PATH", env = "SCRUBLINE_DB")]
    pub db: Option<PathBuf>,

    /// Run the pipeline without writing a database. `--db` is ignored.
    #[arg(long)]
    pub dry_run: bool,

    /// Rule file (YAML or JSON). The built-in rules are used when omitted.
    #[arg(long, value_name = "FILE", env = "SCRUBLINE_RULES")]
    pub rules: Option<PathBuf>,

    /// Ingest settings file (YAML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Rows staged per batch. Overrides the settings file.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Disable these rule ids (comma-separated).
    #[arg(long, short = 'x', value_delimiter = ',')]
    pub disable_rule: Vec<String>,

    /// Ingest without applying any redaction rules.
    #[arg(long)]
    pub no_redact: bool,

    /// Skip the heuristic secret sanitizer.
    #[arg(long)]
    pub no_sanitize: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Exit non-zero when any file was rolled back.
    #[arg(long)]
    pub fail_on_rollback: bool,
}

/// Arguments for the `rules` command.
#[derive(Parser, Debug)]
pub struct RulesCommand {
    /// Rule file (YAML or JSON). The built-in rules are listed when omitted.
    #[arg(long, value_name = "FILE", env = "SCRUBLINE_RULES")]
    pub rules: Option<PathBuf>,

    /// Also list disabled rules.
    #[arg(long)]
    pub include_disabled: bool,

    /// Print one JSON object per rule.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub action: Option<RulesAction>,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// Appends a rule to a rule file, creating the file if needed.
    Add {
        /// Rule file to edit (YAML or JSON).
        #[arg(long, value_name = "FILE", env = "SCRUBLINE_RULES")]
        rules: PathBuf,

        #[arg(long)]
        id: String,

        /// `regex`, `marker` or `literal`.
        #[arg(long = "type", value_name = "KIND")]
        kind: String,

        #[arg(long)]
        pattern: String,

        /// `prompt`, `field` or `global`.
        #[arg(long, default_value = "prompt")]
        scope: String,

        /// Replacement text (defaults to <REDACTED>).
        #[arg(long)]
        replacement: Option<String>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        actor: Option<String>,

        /// Add the rule disabled.
        #[arg(long)]
        disabled: bool,

        /// Match case-sensitively.
        #[arg(long)]
        case_sensitive: bool,

        /// Let `.` match newlines.
        #[arg(long)]
        dotall: bool,
    },

    /// Removes a rule from a rule file.
    Remove {
        /// Rule file to edit (YAML or JSON).
        #[arg(long, value_name = "FILE", env = "SCRUBLINE_RULES")]
        rules: PathBuf,

        #[arg(long)]
        id: String,
    },
}

/// Arguments for the `export` command.
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Source id as stored by `ingest` (the file path it was read from).
    #[arg(value_name = "SOURCE")]
    pub source: String,

    #[arg(long, value_name = "PATH", env = "SCRUBLINE_DB")]
    pub db: Option<PathBuf>,

    /// Rule file (YAML or JSON). The built-in rules are used when omitted.
    #[arg(long, value_name = "FILE", env = "SCRUBLINE_RULES")]
    pub rules: Option<PathBuf>,

    /// Ingest settings file (YAML); only its field targets are used.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable these rule ids (comma-separated).
    #[arg(long, short = 'x', value_delimiter = ',')]
    pub disable_rule: Vec<String>,

    /// Print the stored rows without applying any rules.
    #[arg(long)]
    pub no_redact: bool,

    /// Do not write audit rows for the redactions made.
    #[arg(long)]
    pub no_record: bool,
}

#[derive(Subcommand, Debug)]
pub enum RedactionsCommand {
    /// Lists audit records, manual entries taking precedence per field.
    List {
        #[arg(long, value_name = "PATH", env = "SCRUBLINE_DB")]
        db: Option<PathBuf>,

        /// Only records of this source.
        #[arg(long, value_name = "SOURCE")]
        source: Option<String>,

        /// List every record, without manual precedence.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Records a manual redaction for one field.
    Add {
        #[arg(long, value_name = "PATH", env = "SCRUBLINE_DB")]
        db: Option<PathBuf>,

        #[arg(long, value_name = "SOURCE")]
        source: String,

        /// 1-based prompt index; omit for the session prelude.
        #[arg(long, value_name = "N")]
        prompt: Option<u32>,

        #[arg(long, value_name = "FIELD_PATH")]
        field: String,

        #[arg(long, value_name = "TEXT")]
        replacement: String,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        actor: Option<String>,
    },
}
