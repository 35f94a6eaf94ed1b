use tracing::debug;

use crate::event::{parse_payload, StreamEvent};

const RECORD_SEPARATOR: &str = "\n\n";
const DATA_PREFIX: &str = "data:";

// ─── SseDecoder ───────────────────────────────────────────────────────────

/// Incremental decoder for blank-line delimited `data:` records.
///
/// Chunks may split records, lines, or even UTF-8 sequences anywhere: the
/// decoder holds whatever is incomplete and yields the same events in the
/// same order no matter where the boundaries fell. A record that fails to
/// decode is dropped; it never poisons the rest of the stream.
///
/// One decoder belongs to one phase execution and is discarded with it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.append_bytes(chunk);
        self.drain_records()
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.push(chunk.as_bytes())
    }

    /// The stream closed: decode whatever is still held as a final record.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&rest));
        }
        let mut events = self.drain_records();
        let tail = std::mem::take(&mut self.buffer);
        if !tail.trim().is_empty() {
            events.extend(decode_record(&tail));
        }
        events
    }

    /// `true` when nothing is held back waiting for more bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending.is_empty()
    }

    fn append_bytes(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending);
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // incomplete sequence at the end: wait for the next chunk
                        None => {
                            rest = after;
                            break;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();

        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    fn drain_records(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find(RECORD_SEPARATOR) {
            let record: String = self.buffer.drain(..pos + RECORD_SEPARATOR.len()).collect();
            events.extend(decode_record(&record[..pos]));
        }
        events
    }
}

/// Decode one complete record. Comment lines and non-data fields are ignored;
/// multiple `data:` lines are joined with newlines.
fn decode_record(record: &str) -> Vec<StreamEvent> {
    let mut data: Option<String> = None;
    for line in record.lines() {
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match data.as_mut() {
            Some(d) => {
                d.push('\n');
                d.push_str(rest);
            }
            None => data = Some(rest.to_string()),
        }
    }

    let Some(payload) = data else {
        return Vec::new();
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Vec::new();
    }

    match parse_payload(payload) {
        Ok(events) => {
            if events.is_empty() {
                debug!(payload_len = payload.len(), "dropping unrecognised record");
            }
            events
        }
        Err(e) => {
            debug!(error = %e, payload_len = payload.len(), "dropping malformed record");
            Vec::new()
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
