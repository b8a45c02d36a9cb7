//! Line buffering for the server-sent-events body of a streaming completion.
//!
//! Network chunks do not line up with SSE lines: one chunk may carry several
//! events, and a JSON payload (or a multi-byte UTF-8 character) may be split
//! across two chunks. Bytes are held until a full line is available.

use std::mem;

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the `data:` payloads of every complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Drains a trailing line left without a newline when the body ends.
    pub fn flush(&mut self) -> Option<String> {
        let rest = mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim().strip_prefix("data:")?.trim();
    // Gemini never sends the OpenAI `[DONE]` marker, but tolerate it.
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}
