//! Incremental decoder for the newline-delimited event stream.
//!
//! Chunks arrive at arbitrary byte boundaries; the ingestor carries the
//! trailing incomplete line between calls and never aborts on a malformed
//! frame. The caller is expected to run the feed loop on its own task, so no
//! cooperative yielding happens here.

use tracing::warn;

use super::StreamFrame;

/// Fixed token prefixing every meaningful line.
pub const FRAME_PREFIX: &str = "data: ";

/// One outcome of processing a complete line.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestItem {
    /// A well-formed event frame.
    Frame(StreamFrame),
    /// A prefixed line whose JSON body failed to parse. Non-fatal; the
    /// stream continues with the next line.
    ParseError(String),
}

/// Stateful line framer over an incremental byte source.
#[derive(Debug, Default)]
pub struct StreamIngestor {
    buf: Vec<u8>,
    parse_errors: u64,
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every item completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<IngestItem> {
        self.buf.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(item) = self.process_line(&line[..line.len() - 1]) {
                items.push(item);
            }
        }
        items
    }

    /// Flush the trailing buffered line at end of stream.
    pub fn finish(&mut self) -> Vec<IngestItem> {
        if self.buf.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buf);
        self.process_line(&line).into_iter().collect()
    }

    /// Count of malformed frames skipped so far.
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<IngestItem> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return None;
        }
        // Lines without the frame prefix (heartbeats, comments) are ignored.
        let body = line.strip_prefix(FRAME_PREFIX)?;

        match serde_json::from_str::<StreamFrame>(body) {
            Ok(frame) => Some(IngestItem::Frame(frame)),
            Err(err) => {
                self.parse_errors += 1;
                warn!(%err, line = %line, "skipping malformed stream frame");
                Some(IngestItem::ParseError(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(items: Vec<IngestItem>) -> Vec<StreamFrame> {
        items
            .into_iter()
            .filter_map(|i| match i {
                IngestItem::Frame(f) => Some(f),
                IngestItem::ParseError(_) => None,
            })
            .collect()
    }

    #[test]
    fn complete_line_yields_one_frame() {
        let mut ing = StreamIngestor::new();
        let items = ing.feed(b"data: {\"categoryIndex\":0,\"categoryProgress\":10}\n");
        let fs = frames(items);
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].category_index, Some(0));
    }

    #[test]
    fn partial_line_is_carried_across_chunks() {
        let mut ing = StreamIngestor::new();
        assert!(ing.feed(b"data: {\"categoryIndex\":3,").is_empty());
        assert!(ing.feed(b"\"categoryProgress\":55}").is_empty());
        let fs = frames(ing.feed(b"\ndata: {\"categoryIndex\":4,\"categoryProgress\":5}\n"));
        assert_eq!(fs.len(), 2);
        assert_eq!(fs[0].category_index, Some(3));
        assert_eq!(fs[0].category_progress, Some(55.0));
        assert_eq!(fs[1].category_index, Some(4));
    }

    #[test]
    fn malformed_frame_is_skipped_not_fatal() {
        let mut ing = StreamIngestor::new();
        let items = ing.feed(
            b"data: {not json}\ndata: {\"categoryIndex\":1,\"categoryProgress\":20}\n",
        );
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], IngestItem::ParseError(_)));
        assert!(matches!(items[1], IngestItem::Frame(_)));
        assert_eq!(ing.parse_errors(), 1);
    }

    #[test]
    fn unprefixed_and_blank_lines_are_ignored() {
        let mut ing = StreamIngestor::new();
        let items = ing.feed(b": heartbeat\n\nevent: progress\ndata: {\"progress\":40}\n");
        let fs = frames(items);
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].progress, Some(40.0));
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut ing = StreamIngestor::new();
        let fs = frames(ing.feed(b"data: {\"progress\":12}\r\n"));
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].progress, Some(12.0));
    }

    #[test]
    fn finish_flushes_trailing_unterminated_line() {
        let mut ing = StreamIngestor::new();
        assert!(ing.feed(b"data: {\"progress\":100}").is_empty());
        let fs = frames(ing.finish());
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].progress, Some(100.0));
        assert!(ing.finish().is_empty());
    }

    #[test]
    fn many_frames_in_one_chunk() {
        let mut ing = StreamIngestor::new();
        let mut input = Vec::new();
        for i in 0..25 {
            input.extend_from_slice(
                format!("data: {{\"categoryIndex\":{},\"categoryProgress\":1}}\n", i % 13)
                    .as_bytes(),
            );
        }
        assert_eq!(frames(ing.feed(&input)).len(), 25);
    }
}
