/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x0F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` on malformed input. Surrogate halves that are not part of a pair cannot be
/// represented in a Rust `String`, so they are rejected too.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut string = String::with_capacity(bytes.len());
    let mut pending_high_surrogate: Option<u32> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b0 = bytes[i] as u32;
        let (unit, len) = match b0 {
            0x01..=0x7F => (b0, 1),
            0xC0..=0xDF => {
                let b1 = continuation(bytes.get(i + 1))?;
                ((b0 & 0x1F) << 6 | b1, 2)
            }
            0xE0..=0xEF => {
                let b1 = continuation(bytes.get(i + 1))?;
                let b2 = continuation(bytes.get(i + 2))?;
                ((b0 & 0x0F) << 12 | b1 << 6 | b2, 3)
            }
            _ => return None,
        };
        i += len;

        match (pending_high_surrogate.take(), unit) {
            (None, 0xD800..=0xDBFF) => pending_high_surrogate = Some(unit),
            (Some(high), 0xDC00..=0xDFFF) => {
                let code = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                string.push(char::from_u32(code)?);
            }
            (Some(_), _) | (None, 0xDC00..=0xDFFF) => return None,
            (None, _) => string.push(char::from_u32(unit)?),
        }
    }

    if pending_high_surrogate.is_some() {
        return None;
    }
    Some(string)
}

fn continuation(byte: Option<&u8>) -> Option<u32> {
    match byte {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u32),
        _ => None,
    }
}
