// scrubline/src/source.rs
//! Finding session files and reading them as record streams.

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use scrubline_core::StreamError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No .jsonl files found under {0}")]
    NoSources(PathBuf),

    #[error("Failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Every `*.jsonl` file below `root`, sorted by path. Dated directory
/// layouts (`YYYY/MM/DD`) therefore come out in chronological order.
pub fn discover_sources(root: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>, SourceError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        let is_jsonl = entry.path().extension().is_some_and(|ext| ext == "jsonl");
        if entry.file_type().is_file() && is_jsonl {
            found.push(entry.into_path());
            if limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
        }
    }
    debug!("Discovered {} source file(s) under {}", found.len(), root.display());
    if found.is_empty() {
        return Err(SourceError::NoSources(root.to_path_buf()));
    }
    Ok(found)
}

/// One JSON value per non-blank line.
///
/// A line that is not valid JSON (or not valid UTF-8) yields
/// [`StreamError::Malformed`]; a failing read yields [`StreamError::Io`] and
/// ends the stream.
pub struct JsonlRecords<R: BufRead> {
    lines: Lines<R>,
    line: usize,
    done: bool,
}

impl<R: BufRead> JsonlRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonlRecords<R> {
    type Item = std::result::Result<Value, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.line += 1;
            match self.lines.next()? {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| StreamError::Malformed(format!("line {}: {}", self.line, e))),
                    );
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Some(Err(StreamError::Malformed(format!("line {}: {}", self.line, e))));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(StreamError::Io(format!("line {}: {}", self.line, e))));
                }
            }
        }
    }
}

/// Opens a session file as a record stream.
pub fn open_source(path: &Path) -> Result<JsonlRecords<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(JsonlRecords::new(BufReader::new(file)))
}
