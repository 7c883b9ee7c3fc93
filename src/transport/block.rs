//! SCPI definite-length block framing: `#<n><len><payload>` with an optional single
//! trailing LF. The stateless pieces (header parsing, encoding) live here; the
//! stream-synchronization behavior (draining a too-large payload so a `BufferTooSmall`
//! error never desynchronizes the session) lives on [`super::Session`], since it needs
//! the session's one-byte pushback buffer.

use crate::error::TransportError;

/// Number of ASCII digits needed to write `len` in the block header.
///
/// # Errors
/// [`TransportError::MalformedBlock`] if `len` needs more than 9 digits (the format
/// only reserves one digit for the digit count).
pub fn digits_needed(len: usize) -> Result<u8, TransportError> {
    let digits = if len == 0 {
        1
    } else {
        len.to_string().len()
    };
    u8::try_from(digits)
        .ok()
        .filter(|&d| d >= 1 && d <= 9)
        .ok_or_else(|| TransportError::MalformedBlock(format!("length {len} needs too many digits")))
}

/// Encode `payload` as a definite-length block, e.g. `#3100<payload>` for a 100-byte
/// payload. No trailing LF is appended; callers that want the optional terminator add
/// it themselves.
///
/// # Errors
/// [`TransportError::MalformedBlock`] if the payload is too large to represent.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let n = digits_needed(payload.len())?;
    let len_str = payload.len().to_string();
    let capacity = 2usize
        .saturating_add(len_str.len())
        .saturating_add(payload.len());
    let mut out = Vec::with_capacity(capacity);
    out.push(b'#');
    out.push(b'0'.saturating_add(n));
    out.extend_from_slice(len_str.as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Parse the `<n>` digit-count nibble, one ASCII digit `1`..=`9`.
///
/// # Errors
/// [`TransportError::MalformedBlock`] if the byte is not an ASCII digit in `1..=9`.
pub fn parse_digit_count(b: u8) -> Result<usize, TransportError> {
    if b.is_ascii_digit() && b != b'0' {
        Ok(usize::from(b.saturating_sub(b'0')))
    } else {
        Err(TransportError::MalformedBlock(format!(
            "expected a digit-count nibble in 1..=9, got byte {b:#04x}"
        )))
    }
}

/// Parse the `<len>` field, `n` ASCII decimal digits.
///
/// # Errors
/// [`TransportError::MalformedBlock`] if the bytes are not all ASCII digits or the
/// value does not fit in a `usize`.
pub fn parse_len(digits: &[u8]) -> Result<usize, TransportError> {
    let s = std::str::from_utf8(digits)
        .map_err(|_| TransportError::MalformedBlock("length field is not ASCII".into()))?;
    s.parse()
        .map_err(|_| TransportError::MalformedBlock(format!("invalid length field '{s}'")))
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips() {
        let payload = vec![0xAAu8; 257];
        let framed = encode(&payload).unwrap();
        assert_eq!(framed[0], b'#');
        let n = parse_digit_count(framed[1]).unwrap();
        let len = parse_len(&framed[2..2 + n]).unwrap();
        assert_eq!(len, payload.len());
        assert_eq!(&framed[2 + n..], payload.as_slice());
    }

    #[test]
    fn digits_needed_matches_decimal_width() {
        assert_eq!(digits_needed(0).unwrap(), 1);
        assert_eq!(digits_needed(9).unwrap(), 1);
        assert_eq!(digits_needed(10).unwrap(), 2);
        assert_eq!(digits_needed(100_000).unwrap(), 6);
    }

    #[test]
    fn parse_digit_count_rejects_zero_and_non_digits() {
        assert!(parse_digit_count(b'0').is_err());
        assert!(parse_digit_count(b'a').is_err());
        assert!(parse_digit_count(b'3').is_ok());
    }
}
