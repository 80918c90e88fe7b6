//! Incremental Server-Sent Events decoding for the chat stream
//!
//! The backend streams `text/event-stream` frames. Network chunks do not
//! respect frame boundaries, so the decoder buffers partial lines across
//! `feed` calls and only emits complete `data:` payloads.

/// Buffering SSE line decoder
///
/// Feed it raw body chunks as they arrive; it yields the payload text of
/// each complete `data:` line. Call [`SseFrames::drain`] once the body
/// ends to recover a final payload that lacked a trailing newline.
#[derive(Debug, Default)]
pub struct SseFrames {
    buf: String,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a body chunk, returning any completed `data:` payloads
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            if let Some(payload) = Self::payload_of(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush the buffer at end of stream
    ///
    /// Recovers a trailing payload that arrived without a final newline.
    pub fn drain(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buf);
        rest.lines().filter_map(Self::payload_of).collect()
    }

    fn payload_of(line: &str) -> Option<String> {
        // Comments (": ..."), "event:" lines and blank separators are skipped.
        line.trim()
            .strip_prefix("data:")
            .map(|p| p.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_frame() {
        let mut sse = SseFrames::new();
        assert_eq!(sse.feed(b"data: {\"token\":\"hi\"}\n\n"), vec!["{\"token\":\"hi\"}"]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut sse = SseFrames::new();
        assert!(sse.feed(b"data: {\"tok").is_empty());
        assert_eq!(sse.feed(b"en\":\"hi\"}\n\n"), vec!["{\"token\":\"hi\"}"]);
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut sse = SseFrames::new();
        let out = sse.feed(b"data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(out, vec!["a", "b", "[DONE]"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut sse = SseFrames::new();
        assert_eq!(sse.feed(b"data: a\r\n\r\n"), vec!["a"]);
    }

    #[test]
    fn test_comments_and_event_lines_skipped() {
        let mut sse = SseFrames::new();
        let out = sse.feed(b": keepalive\nevent: message\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_drain_recovers_unterminated_payload() {
        let mut sse = SseFrames::new();
        assert!(sse.feed(b"data: last").is_empty());
        assert_eq!(sse.drain(), vec!["last"]);
        // Drain empties the buffer.
        assert!(sse.drain().is_empty());
    }

    #[test]
    fn test_invalid_utf8_degrades_lossily() {
        let mut sse = SseFrames::new();
        let out = sse.feed(b"data: ab\xffcd\n");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("ab"));
    }
}
