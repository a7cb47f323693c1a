//! Incremental line framing for the inbound byte stream.
//!
//! The receiver terminates lines with `\r`, `\n`, or `\r\n` depending on
//! firmware and transport, and a TCP read (or serial read) can hand back a
//! chunk that ends mid-line or even mid-terminator.  [`LineFramer`]
//! accumulates chunks and emits only complete lines, keeping any trailing
//! partial line buffered for the next call.
//!
//! Splitting rule, applied repeatedly until no terminator remains: a `\r\n`
//! pair anywhere in the buffer is preferred over a lone `\n` or `\r`.  A
//! `\r\n` split across two reads therefore surfaces as a line followed by an
//! empty line; empty lines carry no `=` and are dropped at the parsing
//! stage, so no spurious message results.
//!
//! No line-length bound is enforced; the receiver's own key set bounds line
//! length in practice.

/// Splits an unbounded byte stream into discrete lines.
///
/// Feed raw chunks in arrival order; each call returns the lines completed
/// by that chunk, in order.  Invalid UTF-8 is decoded lossily rather than
/// failing, so a corrupt byte can never wedge the stream.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and drains every complete line from the buffer.
    ///
    /// Empty lines (adjacent terminators) are emitted; callers that parse
    /// `Key=Value` skip them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some((pos, terminator_len)) = self.next_terminator() {
            let line: Vec<u8> = self.buffer.drain(..pos + terminator_len).take(pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Locates the terminator to split on: the first `\r\n` pair if one
    /// exists, otherwise the first `\n`, otherwise the first `\r`.
    fn next_terminator(&self) -> Option<(usize, usize)> {
        if let Some(pos) = self
            .buffer
            .windows(2)
            .position(|pair| pair == b"\r\n")
        {
            return Some((pos, 2));
        }
        if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            return Some((pos, 1));
        }
        self.buffer
            .iter()
            .position(|&b| b == b'\r')
            .map(|pos| (pos, 1))
    }

    /// Flushes any buffered partial line, consuming it.
    ///
    /// Used on disconnect so a final unterminated line is not silently lost
    /// across a connection boundary.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.buffer);
            Some(String::from_utf8_lossy(&rest).into_owned())
        }
    }

    /// Number of buffered bytes not yet part of a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_single_line_with_crlf() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"Main.Volume=-50\r\n");
        assert_eq!(lines, vec!["Main.Volume=-50"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_feed_single_line_with_bare_lf() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"Main.Power=On\n");
        assert_eq!(lines, vec!["Main.Power=On"]);
    }

    #[test]
    fn test_feed_single_line_with_bare_cr() {
        // A bare-CR terminator must emit immediately; the receiver may never
        // send a follow-up byte.
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"Main.Power=On\r");
        assert_eq!(lines, vec!["Main.Power=On"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_feed_crlf_split_across_chunks_yields_line_then_empty() {
        let mut framer = LineFramer::new();
        let first = framer.feed(b"Main.Source=3\r");
        let second = framer.feed(b"\n");
        assert_eq!(first, vec!["Main.Source=3"]);
        // The orphaned `\n` becomes an empty line, discarded at parse time.
        assert_eq!(second, vec![""]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_feed_multiple_lines_in_one_chunk_preserves_order() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"Main.Power=On\r\nMain.Volume=-50\nMain.Mute=Off\r");
        assert_eq!(
            lines,
            vec!["Main.Power=On", "Main.Volume=-50", "Main.Mute=Off"]
        );
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_feed_partial_line_persists_across_calls() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"Main.Vol").is_empty());
        assert!(framer.feed(b"ume=-").is_empty());
        let lines = framer.feed(b"50\r\n");
        assert_eq!(lines, vec!["Main.Volume=-50"]);
    }

    #[test]
    fn test_feed_every_split_offset_yields_identical_payload() {
        // The framer must be insensitive to where the transport splits the
        // stream.  Split a full line at every possible byte offset; only
        // empty lines may differ between offsets.
        let input = b"Main.Volume=-50\r\n";
        for split in 0..=input.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.feed(&input[..split]);
            lines.extend(framer.feed(&input[split..]));
            let non_empty: Vec<&String> = lines.iter().filter(|l| !l.is_empty()).collect();
            assert_eq!(non_empty, vec!["Main.Volume=-50"], "split at offset {split}");
            assert_eq!(framer.pending(), 0, "split at offset {split}");
        }
    }

    #[test]
    fn test_feed_empty_lines_are_emitted() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\r\n\r\nMain.Power=On\r\n");
        assert_eq!(lines, vec!["", "", "Main.Power=On"]);
    }

    #[test]
    fn test_feed_crlf_pair_wins_over_earlier_lone_terminator() {
        // The `\r\n` pair is located first even when a lone terminator
        // precedes it, so the emitted line carries the embedded byte; the
        // trim in `Message::parse` handles the leading/trailing whitespace.
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\nMain.Power=On\r\n");
        assert_eq!(lines, vec!["\nMain.Power=On"]);
    }

    #[test]
    fn test_feed_no_bytes_lost_or_duplicated() {
        // Property from the protocol contract: concatenating all emitted
        // lines plus the leftover buffer reproduces the input minus the
        // terminator bytes.
        let chunks: [&[u8]; 4] = [b"Main.Po", b"wer=On\r\nMain.V", b"olume=-5", b"0\rtail"];
        let mut framer = LineFramer::new();
        let mut emitted = String::new();
        for chunk in chunks {
            for line in framer.feed(chunk) {
                emitted.push_str(&line);
            }
        }
        emitted.push_str(&framer.take_partial().unwrap_or_default());
        assert_eq!(emitted, "Main.Power=OnMain.Volume=-50tail");
    }

    #[test]
    fn test_feed_invalid_utf8_is_decoded_lossily() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"Main.Model=T\xFF778\r\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Main.Model=T"));
        assert!(lines[0].ends_with("778"));
    }

    #[test]
    fn test_take_partial_drains_leftover() {
        let mut framer = LineFramer::new();
        framer.feed(b"half a li");
        assert_eq!(framer.take_partial(), Some("half a li".to_string()));
        assert_eq!(framer.take_partial(), None);
        assert_eq!(framer.pending(), 0);
    }
}
