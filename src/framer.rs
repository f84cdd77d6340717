//! SSE frame reassembly.
//!
//! The backend streams `data: <json>\n\n` frames over a chunked HTTP body.
//! Chunk boundaries fall anywhere, including inside the `\n\n` delimiter
//! itself, so bytes are buffered across reads until a full frame is present.
//! Frames that are empty or comment-only (leading `:`) are dropped here and
//! never reach the extractor.

/// Buffers raw response bytes and yields complete SSE frame payloads.
///
/// The buffer is byte-based rather than string-based so that a multi-byte
/// UTF-8 sequence split across two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

/// Frame delimiter: a blank line between events.
const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Transport prefix on each data frame.
const DATA_PREFIX: &str = "data:";

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes from the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete frame payload, if one is fully buffered.
    ///
    /// Strips the `data: ` prefix and skips empty or comment frames, so a
    /// returned string is always a candidate JSON payload. Returns `None`
    /// when no complete frame remains in the buffer.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let pos = find_delimiter(&self.buffer)?;
            let frame: Vec<u8> = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            let raw = String::from_utf8_lossy(&frame[..pos]).into_owned();
            if let Some(payload) = clean_frame(&raw) {
                return Some(payload);
            }
            // Comment or empty frame: keep draining.
        }
    }

    /// Drain whatever remains in the buffer as one final frame.
    ///
    /// The backend may end the stream without a trailing delimiter; this
    /// flushes that last frame. Returns `None` if the remainder is empty or
    /// comment-only.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        clean_frame(&raw)
    }

    /// Number of buffered bytes not yet consumed.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

/// Strip transport framing from a raw frame, returning the payload.
///
/// `None` means the frame carries nothing dispatchable: blank padding,
/// keep-alive comments, or a bare `data:` line.
fn clean_frame(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c| c == '\r' || c == '\n' || c == ' ');
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let payload = match trimmed.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim_start(),
        None => trimmed,
    };
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}
