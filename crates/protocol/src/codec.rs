use std::io::BufRead;

use log::{error, warn};
use serde_json::Value;

use crate::Document;

/// Lazy, forward-only source of [`Document`]s read from newline-delimited JSON.
///
/// Blank lines are ignored. Lines that are not a JSON object with a usable `"id"`
/// are skipped with a warning, and so are lines that are not valid UTF-8. Only an
/// I/O error ends the stream early.
pub struct NdjsonRecords<B> {
    reader: B,
    line: Vec<u8>,
    line_no: usize,
    skipped: usize,
    done: bool,
}

impl<B: BufRead> NdjsonRecords<B> {
    pub fn new(reader: B) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_no: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Number of non-blank lines that did not yield a document so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(&mut self) -> Option<Document> {
        let trimmed = self.line.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_slice::<Value>(trimmed) {
            Ok(Value::Object(body)) => match Document::from_object(body) {
                Some(doc) => Some(doc),
                None => {
                    warn!("[ndjson] line {}: missing or unusable \"id\"; skipped", self.line_no);
                    self.skipped += 1;
                    None
                }
            },
            Ok(_) => {
                warn!("[ndjson] line {}: not a JSON object; skipped", self.line_no);
                self.skipped += 1;
                None
            }
            Err(e) => {
                warn!("[ndjson] line {}: {e}; skipped", self.line_no);
                self.skipped += 1;
                None
            }
        }
    }
}

impl<B: BufRead> Iterator for NdjsonRecords<B> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        while !self.done {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    if let Some(doc) = self.parse_line() {
                        return Some(doc);
                    }
                }
                Err(e) => {
                    error!("[ndjson] read error after line {}: {e}", self.line_no);
                    self.done = true;
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
