//! Content-type detection from payload bytes.
//!
//! Follows the WHATWG MIME sniffing rules: only the first 512 bytes are
//! examined, markup signatures may be preceded by whitespace, and anything
//! without binary control bytes is plain text. The type an object is stored
//! with always comes from here, never from what the client claims.

const SNIFF_LEN: usize = 512;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN_UTF_8: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML_UTF_8: &str = "text/html; charset=utf-8";

enum Signature {
    /// Case-insensitive HTML tag or comment opener, must be followed by a space or `>`.
    Html(&'static [u8]),
    /// `data[..pattern.len()] & mask == pattern`, optionally after leading whitespace.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_whitespace: bool,
        content_type: &'static str,
    },
    Exact(&'static [u8], &'static str),
    /// RIFF container with a four byte format tag at offset 8.
    Riff(&'static [u8], &'static str),
}

static SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_whitespace: true,
        content_type: "text/xml; charset=utf-8",
    },
    Signature::Exact(b"%PDF-", "application/pdf"),
    Signature::Exact(b"%!PS-Adobe-", "application/postscript"),
    Signature::Exact(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    Signature::Exact(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    Signature::Exact(b"\xEF\xBB\xBF", TEXT_PLAIN_UTF_8),
    Signature::Exact(b"\x00\x00\x01\x00", "image/x-icon"),
    Signature::Exact(b"\x00\x00\x02\x00", "image/x-icon"),
    Signature::Exact(b"BM", "image/bmp"),
    Signature::Exact(b"GIF87a", "image/gif"),
    Signature::Exact(b"GIF89a", "image/gif"),
    Signature::Riff(b"WEBP", "image/webp"),
    Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    Signature::Exact(b"\xFF\xD8\xFF", "image/jpeg"),
    Signature::Riff(b"WAVE", "audio/wave"),
    Signature::Riff(b"AVI ", "video/avi"),
    Signature::Exact(b"OggS\x00", "application/ogg"),
    Signature::Exact(b"ID3", "audio/mpeg"),
    Signature::Exact(b"fLaC", "audio/flac"),
    Signature::Exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    Signature::Exact(b"\x1F\x8B\x08", "application/x-gzip"),
    Signature::Exact(b"PK\x03\x04", "application/zip"),
    Signature::Exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    Signature::Exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    Signature::Exact(b"\x00\x61\x73\x6D", "application/wasm"),
];

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// Control bytes that never appear in text.
fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !is_whitespace(*b))
        .unwrap_or(data.len());
    &data[start..]
}

impl Signature {
    fn matches(&self, data: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = skip_whitespace(data);
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let prefix_matches = tag
                    .iter()
                    .zip(data)
                    .all(|(t, d)| t.eq_ignore_ascii_case(d));
                let terminated = matches!(data[tag.len()], b' ' | b'>');
                (prefix_matches && terminated).then_some(TEXT_HTML_UTF_8)
            }
            Signature::Masked {
                mask,
                pattern,
                skip_whitespace: skip,
                content_type,
            } => {
                let data = if *skip { skip_whitespace(data) } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                mask.iter()
                    .zip(pattern.iter())
                    .zip(data)
                    .all(|((m, p), d)| d & m == *p)
                    .then_some(*content_type)
            }
            Signature::Exact(prefix, content_type) => {
                data.starts_with(prefix).then_some(*content_type)
            }
            Signature::Riff(format, content_type) => (data.len() >= 12
                && data.starts_with(b"RIFF")
                && &data[8..12] == *format)
                .then_some(*content_type),
        }
    }
}

/// Detect the content type of `data`. Always returns a valid MIME type.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(content_type) = SIGNATURES.iter().find_map(|sig| sig.matches(data)) {
        return content_type;
    }
    if data.iter().copied().any(is_binary) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN_UTF_8
    }
}
