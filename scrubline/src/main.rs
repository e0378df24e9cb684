// scrubline/src/main.rs
//! Scrubline entry point.

use anyhow::Result;
use clap::Parser;
use is_terminal::IsTerminal;
use log::debug;
use std::io;
use std::process::ExitCode;

use scrubline::cli::{Cli, Commands};
use scrubline::commands::{export, ingest, redactions, rules};
use scrubline::logger;
use scrubline::ui::output_format;
use scrubline::ui::theme::{ThemeMap, default_theme_map};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_logger(logger::level_from_flags(cli.quiet, cli.debug));
    let theme = default_theme_map();

    match run(&cli, &theme) {
        Ok(code) => code,
        Err(e) => {
            let supports_color = io::stderr().is_terminal();
            output_format::report_error(&mut io::stderr(), &format!("{:#}", e), &theme, supports_color);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, theme: &ThemeMap) -> Result<ExitCode> {
    match &cli.command {
        Commands::Ingest(cmd) => {
            let report = ingest::run_ingest(cmd, theme)?;
            if cmd.fail_on_rollback && report.rolled_back() > 0 {
                debug!("{} unit(s) rolled back; exiting non-zero", report.rolled_back());
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Export(cmd) => export::run_export(cmd, theme)?,
        Commands::Rules(cmd) => rules::run_rules(cmd, theme)?,
        Commands::Redactions(cmd) => redactions::run_redactions(cmd, theme)?,
    }
    Ok(ExitCode::SUCCESS)
}
