//! Blank-line framing for the chat event stream.
//!
//! The server writes one `data: <json>` line per record and terminates each
//! record with an empty line. Network reads split that text at arbitrary
//! byte offsets, so the decoder buffers raw bytes and only cuts at a complete
//! separator. Cutting on bytes also keeps multi-byte UTF-8 sequences intact
//! when a read ends in the middle of a character.

use crate::event::WireRecord;

pub const DATA_PREFIX: &str = "data: ";
const FRAME_SEPARATOR: &[u8] = b"\n\n";

#[derive(Debug, Default)]
/// Incremental frame splitter over successive transport chunks.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Bytes before this offset are known to hold no separator.
    scan_from: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every frame it completed, in order. Any
    /// trailing partial frame stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scan_from;
        while let Some(offset) = find_separator(&self.buffer[search_from..]) {
            let end = search_from + offset;
            if let Some(frame) = Frame::from_bytes(&self.buffer[consumed..end]) {
                frames.push(frame);
            }
            consumed = end + FRAME_SEPARATOR.len();
            search_from = consumed;
        }
        self.buffer.drain(..consumed);
        // Keep the last byte in range so a separator split across chunks is found.
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(FRAME_SEPARATOR.len() - 1);
        frames
    }

    /// Flushes whatever is left once the transport has ended.
    pub fn finish(&mut self) -> Option<Frame> {
        let remainder = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        Frame::from_bytes(&remainder)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(FRAME_SEPARATOR.len())
        .position(|window| window == FRAME_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One blank-line-delimited unit of the stream. Only its `data: ` payload
/// lines are kept; comments and keep-alives are dropped here.
pub struct Frame {
    data_lines: Vec<String>,
}

impl Frame {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        let text = String::from_utf8_lossy(bytes);
        let data_lines = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter_map(|line| line.strip_prefix(DATA_PREFIX))
            .map(str::to_string)
            .collect();
        Some(Self { data_lines })
    }

    pub fn data_lines(&self) -> &[String] {
        &self.data_lines
    }

    pub fn is_empty(&self) -> bool {
        self.data_lines.is_empty()
    }

    /// Parses each payload line independently, so one malformed record does
    /// not hide the others.
    pub fn records(&self) -> Vec<Result<WireRecord, serde_json::Error>> {
        self.data_lines
            .iter()
            .map(|line| serde_json::from_str::<WireRecord>(line))
            .collect()
    }
}
