//! Incremental block parser.
//!
//! Bytes accumulate until a complete block terminator (`LF LF`, `CR CR` or
//! `CR LF CR LF`) is buffered. Only then is the block split into `key: value`
//! lines and turned into a [`ParsedBlock`].

use core::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use bytes_utils::Str;

use super::constants::{
    BOM, CR, DATA_KEY, EVENT_KEY, ID_KEY, KEY_VALUE_DELIMITER, LF, RETRY_KEY, TERMINATORS,
};
use crate::error::DecodeError;

/// Recognised fields of one terminated event block.
///
/// A block without any recognised field is still a block: it parses to the
/// default value, which the connection dispatches as an empty event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBlock {
    /// Last `id` line of the block.
    pub id: Option<Str>,
    /// Last `event` line of the block.
    pub name: Option<Str>,
    /// Last `data` line of the block. Lines are not concatenated.
    pub data: Option<Str>,
    /// Last `retry` line holding a valid non-negative millisecond count.
    pub retry: Option<Duration>,
}

impl ParsedBlock {
    /// Returns `true` if no recognised field was present.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.data.is_none() && self.retry.is_none()
    }
}

/// Buffers raw chunks and yields complete blocks.
///
/// One parser serves one stream; call [`reset`](Self::reset) before feeding
/// bytes from a new connection.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: BytesMut,
    /// Length of the buffer prefix known to be valid UTF-8. Anything past it
    /// is the start of a multi-byte character split across chunks.
    validated: usize,
    started: bool,
}

impl StreamParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard buffered bytes and forget the stream start.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.validated = 0;
        self.started = false;
    }

    /// Number of bytes waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk to the buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the chunk is not UTF-8. The chunk is
    /// dropped and blocks buffered before it are unaffected.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        if chunk.is_empty() {
            return Ok(());
        }

        self.buffer.extend_from_slice(chunk);
        if let Err(e) = self.validate() {
            self.buffer.truncate(self.validated);
            return Err(e);
        }

        if !self.started {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.started = true;
                    self.buffer.advance(BOM.len());
                    self.validated -= BOM.len();
                }
                Some(false) => self.started = true,
                None => {}
            }
        }

        Ok(())
    }

    /// Extract the next terminated block, if one is buffered.
    pub fn next_block(&mut self) -> Option<ParsedBlock> {
        let (end, terminator_len) = find_terminator(&self.buffer[..self.validated])?;

        let block = self.buffer.split_to(end).freeze();
        self.buffer.advance(terminator_len);
        self.validated -= end + terminator_len;

        Some(parse_block(block))
    }

    fn validate(&mut self) -> Result<(), DecodeError> {
        match core::str::from_utf8(&self.buffer[self.validated..]) {
            Ok(_) => {
                self.validated = self.buffer.len();
                Ok(())
            }
            // Truncated multi-byte sequence at the end: wait for more bytes.
            Err(e) if e.error_len().is_none() => {
                self.validated += e.valid_up_to();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Position and length of the earliest block terminator in `buf`.
fn find_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    TERMINATORS
        .iter()
        .filter_map(|t| memchr::memmem::find(buf, t).map(|pos| (pos, t.len())))
        .min_by_key(|&(pos, _)| pos)
}

const fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    match buf.len() {
        0 => None,
        1 => {
            if buf[0] == BOM[0] {
                None
            } else {
                Some(false)
            }
        }
        2 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] {
                None
            } else {
                Some(false)
            }
        }
        _gte_3 => Some(buf[0] == BOM[0] && buf[1] == BOM[1] && buf[2] == BOM[2]),
    }
}

/// Zero-copy field value. `value` must be a substring of the UTF-8 text
/// decoded from `block`.
fn field_value(block: &Bytes, value: &str) -> Str {
    // Safety: `value` borrows from `block` decoded as `str` in `parse_block`,
    // so the sliced bytes are valid UTF-8.
    unsafe { Str::from_inner_unchecked(block.slice_ref(value.as_bytes())) }
}

fn parse_block(block: Bytes) -> ParsedBlock {
    let mut parsed = ParsedBlock::default();

    let Ok(text) = core::str::from_utf8(&block) else {
        return parsed;
    };
    let text = text.trim_matches(|c| c == LF as char || c == CR as char);

    for line in text.split([LF as char, CR as char]) {
        if line.is_empty() {
            continue;
        }

        let Some(delimiter) = line.find(KEY_VALUE_DELIMITER) else {
            continue;
        };
        let value_start = delimiter + KEY_VALUE_DELIMITER.len();
        if value_start == line.len() {
            continue;
        }

        let key = &line[..delimiter];
        let value = &line[value_start..];

        match key {
            ID_KEY => parsed.id = Some(field_value(&block, value)),
            EVENT_KEY => parsed.name = Some(field_value(&block, value)),
            DATA_KEY => parsed.data = Some(field_value(&block, value)),
            RETRY_KEY => {
                if let Ok(millis) = value.parse::<u64>() {
                    parsed.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(chunks: &[&[u8]]) -> Vec<ParsedBlock> {
        let mut parser = StreamParser::new();
        let mut blocks = Vec::new();
        for chunk in chunks {
            let _ = parser.feed(chunk);
            while let Some(block) = parser.next_block() {
                blocks.push(block);
            }
        }
        blocks
    }

    fn block(
        id: Option<&'static str>,
        name: Option<&'static str>,
        data: Option<&'static str>,
    ) -> ParsedBlock {
        ParsedBlock {
            id: id.map(Str::from_static),
            name: name.map(Str::from_static),
            data: data.map(Str::from_static),
            retry: None,
        }
    }

    #[test]
    fn full_block() {
        assert_eq!(
            parse_all(&[b"id: 1\nevent: greet\ndata: hi\n\n"]),
            vec![block(Some("1"), Some("greet"), Some("hi"))]
        );
    }

    #[test]
    fn no_parse_before_terminator() {
        let mut parser = StreamParser::new();
        parser.feed(b"data: hello\n").expect("valid chunk");
        assert!(parser.next_block().is_none());
        assert_eq!(parser.buffered(), 12);

        parser.feed(b"\n").expect("valid chunk");
        assert_eq!(parser.next_block(), Some(block(None, None, Some("hello"))));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn terminators_parse_identically() {
        let expected = vec![block(Some("7"), Some("tick"), Some("payload"))];

        assert_eq!(parse_all(&[b"id: 7\nevent: tick\ndata: payload\n\n"]), expected);
        assert_eq!(parse_all(&[b"id: 7\revent: tick\rdata: payload\r\r"]), expected);
        assert_eq!(
            parse_all(&[b"id: 7\r\nevent: tick\r\ndata: payload\r\n\r\n"]),
            expected
        );
    }

    #[test]
    fn chunk_boundary_independence() {
        let stream: &[u8] =
            b": hello\n\nid: 1\nevent: add\ndata: 73857293\n\ndata: x\r\n\r\nretry: 5000\r\rid: 2\n\n";
        let whole = parse_all(&[stream]);
        assert_eq!(whole.len(), 5);

        for split in 0..=stream.len() {
            let (a, b) = stream.split_at(split);
            assert_eq!(parse_all(&[a, b]), whole, "split at {split}");
        }

        let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(parse_all(&bytewise), whole);
    }

    #[test]
    fn multiple_blocks_in_one_chunk() {
        assert_eq!(
            parse_all(&[b"data: first\n\ndata: second\n\n"]),
            vec![
                block(None, None, Some("first")),
                block(None, None, Some("second")),
            ]
        );
    }

    #[test]
    fn malformed_lines_are_ignored() {
        // No delimiter, delimiter without space, delimiter at end of line.
        assert_eq!(
            parse_all(&[b"data\nid:1\nevent: \ndata: kept\n\n"]),
            vec![block(None, None, Some("kept"))]
        );
    }

    #[test]
    fn comment_lines_are_ignored() {
        assert_eq!(
            parse_all(&[b": keep-alive\ndata: x\n\n"]),
            vec![block(None, None, Some("x"))]
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert_eq!(
            parse_all(&[b"foo: bar\ndata: x\n\n"]),
            vec![block(None, None, Some("x"))]
        );
    }

    #[test]
    fn last_data_line_wins() {
        assert_eq!(
            parse_all(&[b"data: one\ndata: two\n\n"]),
            vec![block(None, None, Some("two"))]
        );
    }

    #[test]
    fn value_keeps_later_delimiters() {
        assert_eq!(
            parse_all(&[b"data: {\"a\": 1}\n\n"]),
            vec![block(None, None, Some("{\"a\": 1}"))]
        );
    }

    #[test]
    fn empty_block_still_parses() {
        let blocks = parse_all(&[b": comment only\n\n"]);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_empty());

        let blocks = parse_all(&[b"\n\n"]);
        assert_eq!(blocks, vec![ParsedBlock::default()]);
    }

    #[test]
    fn retry_field() {
        let blocks = parse_all(&[b"retry: 5000\n\n"]);
        assert_eq!(blocks[0].retry, Some(Duration::from_millis(5000)));

        let blocks = parse_all(&[b"retry: soon\n\n"]);
        assert_eq!(blocks[0].retry, None);

        let blocks = parse_all(&[b"retry: -1\n\n"]);
        assert_eq!(blocks[0].retry, None);
    }

    #[test]
    fn multibyte_field_values() {
        let text = "id: \u{e9}t\u{e9}\nevent: \u{65e5}\u{672c}\ndata: \u{1f600}: ok\n\n";
        assert_eq!(
            parse_all(&[text.as_bytes()]),
            vec![block(
                Some("\u{e9}t\u{e9}"),
                Some("\u{65e5}\u{672c}"),
                Some("\u{1f600}: ok")
            )]
        );
    }

    #[test]
    fn split_multibyte_character() {
        let text = "data: h\u{e9}llo \u{1f600}\n\n".as_bytes();
        // Split in the middle of the four-byte emoji.
        let mid = text.len() - 4;
        let blocks = parse_all(&[&text[..mid], &text[mid..]]);
        assert_eq!(blocks, vec![block(None, None, Some("h\u{e9}llo \u{1f600}"))]);
    }

    #[test]
    fn invalid_chunk_is_dropped() {
        let mut parser = StreamParser::new();
        parser.feed(b"data: ok").expect("valid chunk");
        assert!(parser.feed(b"\xff\xfe").is_err());
        assert_eq!(parser.buffered(), 8);

        parser.feed(b"\n\n").expect("valid chunk");
        assert_eq!(parser.next_block(), Some(block(None, None, Some("ok"))));
    }

    #[test]
    fn bom_is_skipped() {
        assert_eq!(
            parse_all(&[b"\xEF\xBB\xBFdata: test\n\n"]),
            vec![block(None, None, Some("test"))]
        );
        assert_eq!(
            parse_all(&[b"\xEF\xBB", b"\xBFdata: test\n\n"]),
            vec![block(None, None, Some("test"))]
        );
    }

    #[test]
    fn reset_discards_partial_block() {
        let mut parser = StreamParser::new();
        parser.feed(b"data: stale").expect("valid chunk");
        parser.reset();
        parser.feed(b"data: fresh\n\n").expect("valid chunk");
        assert_eq!(parser.next_block(), Some(block(None, None, Some("fresh"))));
    }
}
