//! Incremental parsing of a streamed JSON document.
//!
//! Generation services stream structured JSON token by token. The trailer
//! script and guest list are both documents of the shape
//! `{ "<field>": [ {...}, {...} ], ... }` where each array element must be
//! usable before the document finishes streaming. [`JsonArrayStream`] scans
//! chunks as they arrive and yields every completed element of the named
//! top-level array.
//!
//! A malformed element is logged and skipped; it never aborts consumption of
//! subsequent chunks.

use serde_json::Value;
use tracing::warn;

#[derive(Debug, PartialEq, Eq)]
enum ScanState {
    /// Looking for `"<field>"` followed by `[`.
    SeekingArray,
    /// Inside the array, between elements.
    BetweenElements,
    /// Inside an element, tracking nesting depth.
    InElement,
    /// The array has closed.
    Done,
}

/// Streaming scanner for one named top-level array.
#[derive(Debug)]
pub struct JsonArrayStream {
    field: String,
    buffer: String,
    pos: usize,
    state: ScanState,
    depth: u32,
    in_string: bool,
    escaped: bool,
    element_start: usize,
}

impl JsonArrayStream {
    /// Scan for elements of the top-level array named `field`.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            buffer: String::new(),
            pos: 0,
            state: ScanState::SeekingArray,
            depth: 0,
            in_string: false,
            escaped: false,
            element_start: 0,
        }
    }

    /// Whether the array has closed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// Feed a chunk; returns every array element completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<Value> {
        self.buffer.push_str(chunk);

        if self.state == ScanState::SeekingArray {
            self.seek_array();
        }

        let mut completed = Vec::new();
        // Structural JSON characters are ASCII, so byte scanning is safe;
        // multi-byte characters only occur inside strings.
        while self.pos < self.buffer.len() {
            let byte = self.buffer.as_bytes()[self.pos];
            match self.state {
                ScanState::SeekingArray | ScanState::Done => break,
                ScanState::BetweenElements => match byte {
                    b'{' => {
                        self.state = ScanState::InElement;
                        self.depth = 1;
                        self.in_string = false;
                        self.escaped = false;
                        self.element_start = self.pos;
                    }
                    b']' => self.state = ScanState::Done,
                    _ => {}
                },
                ScanState::InElement => {
                    if self.in_string {
                        if self.escaped {
                            self.escaped = false;
                        } else if byte == b'\\' {
                            self.escaped = true;
                        } else if byte == b'"' {
                            self.in_string = false;
                        }
                    } else {
                        match byte {
                            b'"' => self.in_string = true,
                            b'{' | b'[' => self.depth += 1,
                            b'}' | b']' => {
                                self.depth -= 1;
                                if self.depth == 0 {
                                    let raw = &self.buffer[self.element_start..=self.pos];
                                    match serde_json::from_str::<Value>(raw) {
                                        Ok(value) => completed.push(value),
                                        Err(err) => warn!(
                                            field = %self.field,
                                            error = %err,
                                            "skipping malformed array element"
                                        ),
                                    }
                                    self.state = ScanState::BetweenElements;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            self.pos += 1;
        }
        completed
    }

    /// Parse the full document once streaming ends, for trailing fields
    /// outside the array (e.g. a movie name after the scene list). `None`
    /// when the document never became valid JSON.
    #[must_use]
    pub fn finish(&self) -> Option<Value> {
        serde_json::from_str(&self.buffer).ok()
    }

    /// Locate `"<field>"` and the `[` that follows it.
    fn seek_array(&mut self) {
        let needle = format!("\"{}\"", self.field);
        let Some(found) = self.buffer.find(&needle) else {
            return;
        };
        let after_key = found + needle.len();
        for (offset, byte) in self.buffer.as_bytes()[after_key..].iter().enumerate() {
            match byte {
                b'[' => {
                    self.pos = after_key + offset + 1;
                    self.state = ScanState::BetweenElements;
                    return;
                }
                b':' | b' ' | b'\t' | b'\r' | b'\n' => {}
                _ => return,
            }
        }
    }
}
