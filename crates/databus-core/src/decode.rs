//! Decoding of raw buffers handed over by a transport's receive path.
//!
//! JSON-shaped payloads can arrive with one or two stray bytes after the
//! closing brace (an artefact of the native marshalling boundary).  They are
//! cut off here, before the message reaches the delivery queue, so callers
//! can parse the text as JSON.

const OPEN_BRACE: u8 = b'{';
const CLOSE_BRACE: u8 = b'}';

/// Drop every byte after the last `}` when `raw` starts with `{`.
///
/// Buffers that do not start with `{`, that already end with `}`, or that
/// contain no `}` at all are returned unchanged.
pub fn trim_trailing_bytes(raw: &[u8]) -> &[u8] {
    if raw.first() != Some(&OPEN_BRACE) || raw.last() == Some(&CLOSE_BRACE) {
        return raw;
    }
    match raw.iter().rposition(|&b| b == CLOSE_BRACE) {
        Some(last_brace) => &raw[..=last_brace],
        None => raw,
    }
}

/// Decode a payload buffer into text, trimming stray trailing bytes first.
pub fn decode_payload(raw: &[u8]) -> String {
    String::from_utf8_lossy(trim_trailing_bytes(raw)).into_owned()
}

/// Decode a topic buffer into text.
pub fn decode_topic(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
