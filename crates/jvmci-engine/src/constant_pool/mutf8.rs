//! Modified UTF-8, the encoding of `Symbol` bodies
//!
//! Differs from standard UTF-8 in two ways: NUL is encoded as `C0 80`, and
//! supplementary characters are encoded as a surrogate pair of two 3-byte
//! sequences instead of one 4-byte sequence.

/// Decode modified UTF-8; `None` for malformed input
///
/// Unpaired surrogates cannot be represented in a Rust string and also
/// decode as `None`.
pub fn decode(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 >> 4 {
            0x0..=0x7 if b0 != 0 => {
                units.push(b0 as u16);
                i += 1;
            }
            0xc | 0xd => {
                let b1 = continuation(bytes, i + 1)?;
                units.push(((b0 as u16 & 0x1f) << 6) | b1);
                i += 2;
            }
            0xe => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                units.push(((b0 as u16 & 0x0f) << 12) | (b1 << 6) | b2);
                i += 3;
            }
            _ => return None,
        }
    }
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

fn continuation(bytes: &[u8], at: usize) -> Option<u16> {
    let b = *bytes.get(at)?;
    (b & 0xc0 == 0x80).then_some((b & 0x3f) as u16)
}

/// Encode a string as modified UTF-8
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        assert_eq!(decode(b"hello").as_deref(), Some("hello"));
        assert_eq!(encode("hello"), b"hello");
    }

    #[test]
    fn test_embedded_nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xc0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xc0, 0x80, b'b']).as_deref(), Some("a\0b"));
        assert_eq!(decode(&[b'a', 0x00]), None);
    }

    #[test]
    fn test_supplementary_is_surrogate_pair() {
        let s = "x\u{1F600}";
        let bytes = encode(s);
        assert_eq!(bytes.len(), 1 + 6);
        assert_eq!(decode(&bytes).as_deref(), Some(s));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(decode(&[0xc3]), None);
        assert_eq!(decode(&[0xe2, 0x82]), None);
        assert_eq!(decode(&[0xe2, 0x41, 0x80]), None);
        assert_eq!(decode(&[0xf0, 0x9f, 0x98, 0x80]), None);
        // lone high surrogate
        assert_eq!(decode(&[0xed, 0xa0, 0x80]), None);
    }

    #[test]
    fn test_two_byte_range() {
        assert_eq!(decode(&encode("caf\u{e9}")).as_deref(), Some("caf\u{e9}"));
    }
}
