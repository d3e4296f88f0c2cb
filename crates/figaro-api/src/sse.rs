//! Incremental Server-Sent Events scanner.
//!
//! Feeds raw response bytes in, yields complete events out. Only the
//! `event` and `data` fields matter for the Messages API; everything else
//! is skipped. Accepts both LF and CRLF line endings.

/// One complete SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented scanner holding the state of the event being built.
#[derive(Default)]
pub struct SseScanner {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of bytes, returning every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw[..pos]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                // Blank line terminates the current event.
                if let Some(event) = self.take_event() {
                    out.push(event);
                }
            } else {
                self.consume_line(&line);
            }
        }

        out
    }

    fn consume_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return; // comment
        }
        let (field, value) = match line.split_once(':') {
            // One leading space after the colon is part of the delimiter.
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: data.join("\n"),
        })
    }
}
