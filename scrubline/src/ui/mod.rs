// scrubline/src/ui/mod.rs
//! Terminal output: themes, status messages and report tables.

pub mod output_format;
pub mod redaction_summary;
pub mod theme;
