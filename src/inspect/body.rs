//! Body decoding shared by filtering, search and export
//!
//! The capture feed hands out the complete HTTP message base64 encoded.
//! Decoding tries the standard alphabet first, then the URL-safe one, and
//! finally treats the payload as literal text. The body is whatever follows
//! the first blank line of the message.

use base64::{engine::general_purpose, Engine as _};

/// Strictly decode a raw payload, trying both base64 alphabets
pub fn decode_message(raw: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD
        .decode(raw)
        .or_else(|_| general_purpose::URL_SAFE.decode(raw))
}

/// Segment after the first `\r\n\r\n` or `\n\n`, or everything when the
/// message has no header block
fn split_body(message: &[u8]) -> &[u8] {
    let crlf = find(message, b"\r\n\r\n").map(|i| i + 4);
    let lf = find(message, b"\n\n").map(|i| i + 2);
    let start = match (crlf, lf) {
        (Some(a), Some(b)) => {
            // whichever separator appears first wins
            if a - 4 <= b - 2 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 0,
    };
    &message[start..]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Textual body of a raw payload; never fails
pub fn body_text(raw: &[u8]) -> String {
    match decode_message(raw) {
        Ok(message) => String::from_utf8_lossy(split_body(&message)).into_owned(),
        Err(_) => String::from_utf8_lossy(split_body(raw)).into_owned(),
    }
}

/// Byte length of the decoded body; 0 when the payload is not base64
pub fn body_size(raw: &[u8]) -> usize {
    decode_message(raw)
        .map(|message| split_body(&message).len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> Vec<u8> {
        general_purpose::STANDARD.encode(text).into_bytes()
    }

    #[test]
    fn decodes_standard_base64_and_strips_headers() {
        let raw = encode("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello world");
        assert_eq!(body_text(&raw), "hello world");
        assert_eq!(body_size(&raw), 11);
    }

    #[test]
    fn decodes_url_safe_alphabet() {
        // 0xfb 0xff encodes to "-_8=" in the URL-safe alphabet only
        let mut message = b"POST / HTTP/1.1\n\n".to_vec();
        message.extend_from_slice(&[0xfb, 0xff]);
        let raw = general_purpose::URL_SAFE.encode(&message).into_bytes();
        assert!(general_purpose::STANDARD.decode(&raw).is_err());
        assert_eq!(decode_message(&raw).unwrap(), message);
        assert_eq!(body_size(&raw), 2);
    }

    #[test]
    fn literal_text_is_used_when_not_base64() {
        let raw = b"{\"plain\": true}";
        assert_eq!(body_text(raw), "{\"plain\": true}");
        assert_eq!(body_size(raw), 0);
    }

    #[test]
    fn missing_separator_keeps_whole_message() {
        let raw = encode("just a body");
        assert_eq!(body_text(&raw), "just a body");
    }

    #[test]
    fn first_separator_wins() {
        let raw = encode("GET / HTTP/1.1\n\nfirst\r\n\r\nsecond");
        assert_eq!(body_text(&raw), "first\r\n\r\nsecond");

        let raw = encode("GET / HTTP/1.1\r\n\r\nfirst\n\nsecond");
        assert_eq!(body_text(&raw), "first\n\nsecond");
    }

    #[test]
    fn empty_payload_has_empty_body() {
        assert_eq!(body_text(b""), "");
        assert_eq!(body_size(b""), 0);
    }
}
