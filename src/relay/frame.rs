//! SSE wire framing: line reassembly and frame accumulation.
//!
//! The relay delivers newline-delimited text, but the HTTP transport hands us
//! arbitrary byte chunks. A chunk may end mid-line (or mid-codepoint), so
//! [`LineBuffer`] reassembles complete lines across chunks before
//! [`FrameParser`] accumulates them into events.
//!
//! # Frame Grammar
//!
//! - `: comment` lines are ignored
//! - `event: <type>` sets the pending event type
//! - `data: <payload>` appends a data line
//! - a blank line flushes the pending frame iff any data was accumulated
//!   (multiple data lines are joined with `\n`), then resets parser state
//! - lines with any other field name are ignored

/// Reassembles complete lines from arbitrary byte chunks.
///
/// Splits only at `\n` (tolerating a trailing `\r`), so a UTF-8 codepoint
/// split across chunks is reassembled intact before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer::default()
    }

    /// Appends a chunk and returns every line completed by it, in order.
    /// Bytes after the last newline stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The `event:` field value, if one was present in the frame.
    pub event_type: Option<String>,

    /// All `data:` lines, joined with `\n`.
    pub data: String,
}

impl Frame {
    /// Returns true when the frame should be forwarded for payload decoding:
    /// event type absent or `"message"`. Everything else (relay pings,
    /// `ready` markers) is dropped.
    pub fn is_message(&self) -> bool {
        matches!(self.event_type.as_deref(), None | Some("message"))
    }
}

/// Accumulates `field: value` lines into frames.
#[derive(Debug, Default)]
pub struct FrameParser {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser::default()
    }

    /// Feeds one complete line; returns a frame when a blank line flushes
    /// accumulated data.
    pub fn feed_line(&mut self, line: &str) -> Option<Frame> {
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event_type = Some(value.trim().to_string());
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim().to_string());
            return None;
        }
        if line.is_empty() {
            let frame = if self.data_lines.is_empty() {
                None
            } else {
                Some(Frame {
                    event_type: self.event_type.take(),
                    data: self.data_lines.join("\n"),
                })
            };
            self.event_type = None;
            self.data_lines.clear();
            return frame;
        }
        // Unrecognized field: ignored, does not flush.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut FrameParser, lines: &[&str]) -> Vec<Frame> {
        lines.iter().filter_map(|l| parser.feed_line(l)).collect()
    }

    #[test]
    fn reassembles_line_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        let mut parser = FrameParser::new();

        assert!(buffer.push(b"data: a").is_empty());
        let lines = buffer.push(b"bc\n\n");
        assert_eq!(lines, vec!["data: abc".to_string(), String::new()]);

        let frames: Vec<Frame> = lines
            .iter()
            .filter_map(|l| parser.feed_line(l))
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "abc");
        assert_eq!(frames[0].event_type, None);
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: hello\r\n\r\n");
        assert_eq!(lines, vec!["data: hello".to_string(), String::new()]);
    }

    #[test]
    fn buffers_partial_utf8_across_chunks() {
        let mut buffer = LineBuffer::new();
        let bytes = "data: caf\u{e9}\n".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let split = bytes.len() - 2;
        assert!(buffer.push(&bytes[..split]).is_empty());
        let lines = buffer.push(&bytes[split..]);
        assert_eq!(lines, vec!["data: caf\u{e9}".to_string()]);
    }

    #[test]
    fn event_type_is_captured_and_reset() {
        let mut parser = FrameParser::new();
        let frames = feed_all(
            &mut parser,
            &["event: message", "data: one", "", "data: two", ""],
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_type.as_deref(), Some("message"));
        assert_eq!(frames[0].data, "one");
        assert_eq!(frames[1].event_type, None);
        assert_eq!(frames[1].data, "two");
    }

    #[test]
    fn multiple_data_lines_joined_with_newline() {
        let mut parser = FrameParser::new();
        let frames = feed_all(&mut parser, &["data: first", "data: second", ""]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut parser = FrameParser::new();
        let frames = feed_all(
            &mut parser,
            &[": keep-alive", "id: 7", "retry: 500", "data: x", ""],
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn blank_line_without_data_flushes_nothing() {
        let mut parser = FrameParser::new();
        let frames = feed_all(&mut parser, &["event: ping", "", "data: after", ""]);
        // The ping frame had no data, so only the second frame comes out,
        // and it must not inherit the stale event type.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type, None);
        assert_eq!(frames[0].data, "after");
    }

    #[test]
    fn non_message_frames_are_not_forwarded() {
        let message = Frame {
            event_type: None,
            data: "{}".into(),
        };
        let explicit = Frame {
            event_type: Some("message".into()),
            data: "{}".into(),
        };
        let ready = Frame {
            event_type: Some("ready".into()),
            data: "{}".into(),
        };
        assert!(message.is_message());
        assert!(explicit.is_message());
        assert!(!ready.is_message());
    }
}
