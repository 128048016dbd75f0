//! Multi-encoding text decoding for record payloads.
//!
//! Bibliographic feeds in the CJK world arrive in a mix of legacy
//! encodings.  Decoding is best-effort and never fails: UTF-8 wins
//! outright, then each candidate encoding is tried in a fixed order
//! and the first clean decode (no replacement characters) is used,
//! with statistical detection as the last resort.

use encoding_rs::{Encoding, BIG5, EUC_JP, EUC_KR, GBK, SHIFT_JIS};

const REPLACEMENT: char = '\u{FFFD}';

// Order matters: GBK is by far the most common legacy encoding in
// the feeds this engine sees, and several of these overlap.
const CANDIDATES: [&Encoding; 5] = [GBK, BIG5, SHIFT_JIS, EUC_JP, EUC_KR];

/// Decode arbitrary bytes into a String.
///
/// # Examples
///
/// ```
/// // UTF-8 input is returned as-is.
/// assert_eq!(marcrec::text::decode("Pièce".as_bytes()), "Pièce");
///
/// // GBK bytes for "中国".
/// assert_eq!(marcrec::text::decode(&[0xD6, 0xD0, 0xB9, 0xFA]), "中国");
/// ```
pub fn decode(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    for encoding in CANDIDATES {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors && !text.contains(REPLACEMENT) {
            return text.into_owned();
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guessed = detector.guess(None, true);

    guessed.decode(bytes).0.into_owned()
}
