use encoding_rs::{Decoder, Encoding, UTF_8};
use regex::Regex;
use std::io::{self, Read};
use std::sync::LazyLock;

use crate::doc::Phase;

/// Bytes inspected when sniffing an encoding from the content itself.
pub const SNIFF_LENGTH: usize = 4096;

static META_CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

static META_HTTP_EQUIV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?http-equiv\s*=\s*["']?content-type["']?[^>]*?content\s*=\s*["']?[^"'>]*?charset\s*=\s*([^"'\s;/>]+)"#).unwrap()
});

/// Resolves the character encoding of a document's content.
pub trait CharsetDetector: Send + Sync {
    /// `head` holds the first bytes of the content, `declared` any charset the
    /// document metadata claims.
    fn detect(&self, head: &[u8], declared: Option<&str>, phase: Phase) -> &'static Encoding;
}

/// Declared charset first, then `<meta>` declarations, then a statistical
/// guess. Parsed content is always UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingCharsetDetector;

impl CharsetDetector for SniffingCharsetDetector {
    fn detect(&self, head: &[u8], declared: Option<&str>, phase: Phase) -> &'static Encoding {
        if phase.is_parsed() {
            return UTF_8;
        }

        if let Some(encoding) = declared.and_then(encoding_for_label) {
            return encoding;
        }

        let head = &head[..head.len().min(SNIFF_LENGTH)];
        let search_str = String::from_utf8_lossy(head);
        for regex in [&*META_CHARSET_REGEX, &*META_HTTP_EQUIV_REGEX] {
            if let Some(encoding) = regex
                .captures(&search_str)
                .and_then(|caps| caps.get(1))
                .and_then(|m| encoding_for_label(m.as_str()))
            {
                return encoding;
            }
        }

        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(head, false);
        detector.guess(None, true)
    }
}

pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().to_lowercase().as_bytes())
}

/// Decodes at most `max_bytes` of `reader`. Returns the text and whether
/// anything was left unread. A multi-byte sequence cut by the bound is dropped.
pub fn decode_bounded<R: Read>(
    reader: R,
    encoding: &'static Encoding,
    max_bytes: usize,
) -> io::Result<(String, bool)> {
    let mut buf = Vec::new();
    reader
        .take((max_bytes as u64).saturating_add(1))
        .read_to_end(&mut buf)?;
    let truncated = buf.len() > max_bytes;
    buf.truncate(max_bytes);

    let mut decoder = encoding.new_decoder();
    Ok((decode_into_string(&mut decoder, &buf, !truncated), truncated))
}

/// Decodes a reader in successive chunks of at most `chunk_bytes` input
/// bytes. Characters split across a chunk boundary are carried over to the
/// next chunk. Empty input still yields one empty chunk.
pub struct TextChunks<R> {
    reader: R,
    decoder: Decoder,
    chunk_bytes: usize,
    first: bool,
    done: bool,
}

impl<R: Read> TextChunks<R> {
    pub fn new(reader: R, encoding: &'static Encoding, chunk_bytes: usize) -> Self {
        Self {
            reader,
            decoder: encoding.new_decoder(),
            chunk_bytes: chunk_bytes.max(1),
            first: true,
            done: false,
        }
    }
}

impl<R: Read> Iterator for TextChunks<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut raw = Vec::new();
        if let Err(e) = (&mut self.reader)
            .take(self.chunk_bytes as u64)
            .read_to_end(&mut raw)
        {
            self.done = true;
            return Some(Err(e));
        }
        let last = raw.len() < self.chunk_bytes;
        let text = decode_into_string(&mut self.decoder, &raw, last);
        self.done = last;

        let first = std::mem::replace(&mut self.first, false);
        if first || !raw.is_empty() || !text.is_empty() {
            Some(Ok(text))
        } else {
            None
        }
    }
}

fn decode_into_string(decoder: &mut Decoder, bytes: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(bytes.len())
        .unwrap_or(bytes.len() * 3 + 16);
    let mut out = String::with_capacity(capacity);
    let _ = decoder.decode_to_string(bytes, &mut out, last);
    out
}
