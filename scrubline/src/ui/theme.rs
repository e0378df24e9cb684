// scrubline/src/ui/theme.rs
//! Terminal colors for the different kinds of CLI output.

use owo_colors::AnsiColors;
use std::collections::HashMap;

/// Type alias for the theme map.
pub type ThemeMap = HashMap<ThemeEntry, AnsiColors>;

/// The logical parts of the output that get a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeEntry {
    Header,
    Success,
    Info,
    Warn,
    Error,
}

/// The default color mapping.
pub fn default_theme_map() -> ThemeMap {
    HashMap::from([
        (ThemeEntry::Header, AnsiColors::BrightCyan),
        (ThemeEntry::Success, AnsiColors::Green),
        (ThemeEntry::Info, AnsiColors::White),
        (ThemeEntry::Warn, AnsiColors::Yellow),
        (ThemeEntry::Error, AnsiColors::BrightRed),
    ])
}

/// Color for `entry`, white when the map has none.
pub fn color_for(theme: &ThemeMap, entry: ThemeEntry) -> AnsiColors {
    theme.get(&entry).copied().unwrap_or(AnsiColors::White)
}
