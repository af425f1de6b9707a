//! Decoder for the `data: <json>` line protocol of streamed completions.
//!
//! Bytes go in chunk by chunk; text deltas come out. Only complete lines
//! are ever classified, so the emitted deltas do not depend on where the
//! transport happened to split the body.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Ignored,
    Done,
    Data(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    if line.trim().is_empty() || line.starts_with(':') {
        return Line::Ignored;
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Ignored;
    };
    match rest.trim() {
        DONE_SENTINEL => Line::Done,
        "" => Line::Ignored,
        payload => Line::Data(payload),
    }
}

/// Text at `choices[0].delta.content`. Any other shape, and anything
/// beside it, is ignored.
fn delta_content(value: &Value) -> Option<String> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

#[derive(Debug)]
enum Payload {
    Parsed(Option<String>),
    /// The payload ends before the JSON value does.
    Incomplete,
    Malformed(serde_json::Error),
}

fn parse_payload(payload: &str) -> Payload {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => Payload::Parsed(delta_content(&value)),
        Err(e) if e.is_eof() => Payload::Incomplete,
        Err(e) => Payload::Malformed(e),
    }
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Trailing bytes of an unfinished UTF-8 sequence.
    bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    buffer: String,
    /// A data payload that was cut off mid-value, retried with the next line.
    pending: Option<String>,
    done: bool,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of frames dropped because their payload was not JSON.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    /// Feed one chunk of the body and collect the deltas it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        self.decode_utf8(chunk);

        let buffer = std::mem::take(&mut self.buffer);
        let mut rest = buffer.as_str();
        while let Some(newline) = rest.find('\n') {
            if self.done {
                break;
            }
            let line = &rest[..newline];
            rest = &rest[newline + 1..];
            self.handle_line(line, &mut deltas);
        }
        if !self.done {
            self.buffer = rest.to_string();
        }

        deltas
    }

    /// Flush whatever is left once the body has ended. A final frame without
    /// a trailing newline still yields its delta; anything unparsable is
    /// dropped since no more input is coming.
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        if !self.bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.bytes).into_owned();
            self.bytes.clear();
            self.buffer.push_str(&tail);
        }

        let residual = std::mem::take(&mut self.buffer);
        if !residual.is_empty() {
            for line in residual.split('\n') {
                if self.done {
                    break;
                }
                self.handle_line(line, &mut deltas);
            }
        }

        if let Some(pending) = self.pending.take() {
            self.malformed += 1;
            tracing::warn!(
                "Dropping truncated stream frame at end of body ({} bytes)",
                pending.len()
            );
        }

        deltas
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);

        let mut start = 0;
        while start < self.bytes.len() {
            match std::str::from_utf8(&self.bytes[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = self.bytes.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.bytes[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete sequence at the end: wait for the next chunk
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.bytes.drain(..start);
    }

    fn handle_line(&mut self, line: &str, deltas: &mut Vec<String>) {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(pending) = self.pending.take() {
            let candidate = format!("{}\n{}", pending, line);
            match parse_payload(&candidate) {
                Payload::Parsed(delta) => {
                    deltas.extend(delta);
                    return;
                }
                Payload::Incomplete => {
                    self.pending = Some(candidate);
                    return;
                }
                Payload::Malformed(e) => {
                    self.malformed += 1;
                    tracing::warn!("Dropping truncated stream frame: {}", e);
                    // The current line may be a fresh frame of its own
                }
            }
        }

        match classify_line(line) {
            Line::Ignored => {}
            Line::Done => {
                tracing::debug!("Stream finished with sentinel");
                self.done = true;
            }
            Line::Data(payload) => match parse_payload(payload) {
                Payload::Parsed(delta) => deltas.extend(delta),
                Payload::Incomplete => {
                    tracing::debug!("Stream frame split mid-value, waiting for more input");
                    self.pending = Some(payload.to_string());
                }
                Payload::Malformed(e) => {
                    self.malformed += 1;
                    tracing::warn!("Failed to parse stream frame: {}", e);
                }
            },
        }
    }
}
