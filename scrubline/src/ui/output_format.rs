// scrubline/src/ui/output_format.rs
//! Prefixed, optionally colored status messages.

use owo_colors::OwoColorize;
use std::io::{self, Write};

use super::theme::{ThemeEntry, ThemeMap, color_for};

fn print_message<W: Write>(
    writer: &mut W,
    prefix: &str,
    msg: &str,
    entry: ThemeEntry,
    theme: &ThemeMap,
    supports_color: bool,
) -> io::Result<()> {
    let line = format!("{} {}", prefix, msg);
    if supports_color {
        writeln!(writer, "{}", line.color(color_for(theme, entry)))
    } else {
        writeln!(writer, "{}", line)
    }
}

pub fn print_info_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "[INFO]", msg, ThemeEntry::Info, theme, supports_color)
}

pub fn print_success_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "[OK]", msg, ThemeEntry::Success, theme, supports_color)
}

pub fn print_warn_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "[WARN]", msg, ThemeEntry::Warn, theme, supports_color)
}

pub fn print_error_message<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) -> io::Result<()> {
    print_message(writer, "[ERROR]", msg, ThemeEntry::Error, theme, supports_color)
}

/// Prints a fatal error to `writer`, falling back to plain stderr when the
/// writer itself fails.
pub fn report_error<W: Write>(writer: &mut W, msg: &str, theme: &ThemeMap, supports_color: bool) {
    if let Err(e) = print_error_message(writer, msg, theme, supports_color) {
        eprintln!("[ERROR] {} (error output failed: {})", msg, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::theme::default_theme_map;

    #[test]
    fn plain_output_has_no_escape_codes() {
        let mut out = Vec::new();
        print_warn_message(&mut out, "careful", &default_theme_map(), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[WARN] careful\n");
    }

    #[test]
    fn colored_output_wraps_the_line() {
        let mut out = Vec::new();
        print_error_message(&mut out, "boom", &default_theme_map(), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[ERROR] boom"));
        assert!(text.starts_with('\u{1b}'));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_returned() {
        let err = print_error_message(&mut BrokenPipe, "boom", &default_theme_map(), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn report_error_survives_a_broken_writer() {
        report_error(&mut BrokenPipe, "boom", &default_theme_map(), false);

        let mut out = Vec::new();
        report_error(&mut out, "boom", &default_theme_map(), false);
        assert_eq!(String::from_utf8(out).unwrap(), "[ERROR] boom\n");
    }
}
