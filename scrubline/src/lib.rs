// scrubline/src/lib.rs
//! # Scrubline CLI
//!
//! Command-line front end for `scrubline-core`: finds and reads JSONL
//! session files, persists them to SQLite and renders run reports.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod source;
pub mod store;
pub mod ui;

pub use store::SqliteGateway;
