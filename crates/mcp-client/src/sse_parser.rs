//! Incremental server-sent-event frame parser.
//!
//! Events are separated by blank lines. Within an event, `event:`,
//! `data:`, `id:` and `retry:` lines are recognised; `data:` values on
//! consecutive lines are joined with a newline; lines starting with `:`
//! are comments. CR/LF pairs and lone CRs normalise to LF before
//! framing.

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SseEvent {
    /// The `event:` field; `None` means the default event type.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Event name with the SSE default applied.
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Streaming parser: push chunks in, get complete events out. Trailing
/// partial events stay buffered for the next push.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(&normalize_newlines(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos).collect();
            self.buffer.drain(..2);
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing block after the stream closed without a final
    /// blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        if block.trim().is_empty() {
            None
        } else {
            parse_block(&block)
        }
    }
}

fn normalize_newlines(chunk: &str) -> String {
    chunk.replace("\r\n", "\n").replace('\r', "\n")
}

/// Parse one blank-line-delimited block. Returns `None` for blocks
/// containing only comments or nothing at all.
fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut saw_field = false;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => {
                event.event = Some(value.to_string());
                saw_field = true;
            }
            "data" => {
                data_lines.push(value);
                saw_field = true;
            }
            "id" => {
                event.id = Some(value.to_string());
                saw_field = true;
            }
            "retry" => {
                event.retry = value.parse().ok();
                saw_field = true;
            }
            _ => {}
        }
    }

    if !saw_field {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_complete_event() {
        let mut p = SseParser::new();
        let events = p.push("event: message\ndata: {\"hello\":\"world\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "message");
        assert_eq!(events[0].data, "{\"hello\":\"world\"}");
    }

    #[test]
    fn default_event_name_is_message() {
        let mut p = SseParser::new();
        let events = p.push("data: payload\n\n");
        assert_eq!(events[0].event, None);
        assert_eq!(events[0].name(), "message");
    }

    #[test]
    fn endpoint_event() {
        let mut p = SseParser::new();
        let events = p.push("event: endpoint\ndata: /messages?sessionId=abc\n\n");
        assert_eq!(events[0].name(), "endpoint");
        assert_eq!(events[0].data, "/messages?sessionId=abc");
    }

    #[test]
    fn consecutive_data_lines_join_with_newline() {
        let mut p = SseParser::new();
        let events = p.push("data: first\ndata: second\n\n");
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn crlf_normalisation() {
        let mut p = SseParser::new();
        let events = p.push("event: message\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn partial_event_stays_buffered() {
        let mut p = SseParser::new();
        assert!(p.push("data: par").is_empty());
        let events = p.push("tial\n\n");
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn chunk_split_across_delimiter() {
        let mut p = SseParser::new();
        assert!(p.push("data: a\n").is_empty());
        let events = p.push("\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }

    #[test]
    fn comments_are_ignored() {
        let mut p = SseParser::new();
        assert!(p.push(": keep-alive\n\n").is_empty());
        let events = p.push(": ping\ndata: real\n\n");
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn id_and_retry_fields() {
        let mut p = SseParser::new();
        let events = p.push("id: 42\nretry: 5000\ndata: payload\n\n");
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].retry, Some(5000));
    }

    #[test]
    fn finish_flushes_trailing_block() {
        let mut p = SseParser::new();
        assert!(p.push("data: tail").is_empty());
        let last = p.finish().unwrap();
        assert_eq!(last.data, "tail");
        assert!(p.finish().is_none());
    }

    #[test]
    fn space_after_colon_is_optional() {
        let mut p = SseParser::new();
        let events = p.push("data:nospace\n\n");
        assert_eq!(events[0].data, "nospace");
    }
}
