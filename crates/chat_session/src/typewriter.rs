//! Typewriter buffer - decouples display pace from network arrival
//!
//! Single-writer single-reader: the network side appends whole chunks,
//! a fixed-cadence drain consumes a few characters per step. The drain
//! step is a pure function of the buffer, so tests can drive it
//! without a clock. Completion means the network side closed the
//! buffer AND every buffered character has been drained.
//!
//! Chunks arrive on arbitrary byte boundaries, so a multi-byte UTF-8
//! sequence can be torn across two chunks. `push_bytes` holds the
//! incomplete trailing sequence and prepends it to the next chunk, so
//! the drained text always equals the concatenated network bytes.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct TypewriterBuffer {
    pending: VecDeque<char>,
    /// Trailing bytes of the last chunk that did not complete a UTF-8
    /// sequence, waiting for the next chunk.
    partial: Vec<u8>,
    closed: bool,
}

impl TypewriterBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk. Incomplete trailing sequences carry
    /// over to the next call; invalid bytes decode to U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(!self.closed, "push after close");
        self.partial.extend_from_slice(bytes);
        let mut rest = std::mem::take(&mut self.partial);
        loop {
            match std::str::from_utf8(&rest) {
                Ok(text) => {
                    self.pending.extend(text.chars());
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.pending
                        .extend(String::from_utf8_lossy(&rest[..valid]).chars());
                    match err.error_len() {
                        // Sequence truncated at the chunk boundary:
                        // keep the tail for the next chunk.
                        None => {
                            rest.drain(..valid);
                            self.partial = rest;
                            return;
                        }
                        // Genuinely invalid bytes: substitute and
                        // resync after them.
                        Some(skip) => {
                            self.pending.push_back(char::REPLACEMENT_CHARACTER);
                            rest.drain(..valid + skip);
                        }
                    }
                }
            }
        }
    }

    /// Append already-decoded text.
    pub fn push_str(&mut self, text: &str) {
        debug_assert!(!self.closed, "push after close");
        self.pending.extend(text.chars());
    }

    /// The network side finished (stream closed or failed). A dangling
    /// partial sequence can never complete now; it decodes lossily.
    pub fn close(&mut self) {
        if !self.partial.is_empty() {
            self.pending
                .extend(String::from_utf8_lossy(&self.partial).chars());
            self.partial.clear();
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Closed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    /// Take up to `max_chars` characters off the front of the buffer.
    pub fn drain_step(&mut self, max_chars: usize) -> String {
        let take = max_chars.min(self.pending.len());
        self.pending.drain(..take).collect()
    }
}
