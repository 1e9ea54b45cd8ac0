//! VarInt encoding as used by the Server List Ping protocol.
//!
//! The type is specified [in wiki.vg](https://wiki.vg/Protocol#VarInt_and_VarLong):
//! seven data bits per byte, least significant group first, high bit set on
//! every byte except the last.

use crate::errors::ProtocolError;
use bytes::Bytes;

pub(crate) const SEGMENT_BITS: u8 = 0x7f; // 0111 1111
pub(crate) const CONTINUE_BIT: u8 = 0x80; // 1000 0000

/// Maximum encoded size of an in-memory VarInt.
pub(crate) const MAX_VARINT_LEN: usize = 5;

/// Encode `value` as a VarInt.
///
/// Negative values always occupy the full five bytes, since they are
/// encoded from the two's complement bit pattern.
pub(crate) fn encode_varint(value: i32) -> Bytes {
    let mut remaining = u64::from(value as u32);
    let mut buffer = Vec::with_capacity(MAX_VARINT_LEN);

    loop {
        let byte = (remaining & u64::from(SEGMENT_BITS)) as u8;
        remaining >>= 7;

        if remaining == 0 {
            buffer.push(byte);
            break;
        }

        buffer.push(byte | CONTINUE_BIT);
    }

    Bytes::from(buffer)
}

/// Decode a VarInt from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Fails with
/// [`ProtocolError::InvalidVarInt`] if no terminating byte is found within
/// [`MAX_VARINT_LEN`] bytes.
pub(crate) fn decode_varint(bytes: &[u8]) -> Result<(i32, usize), ProtocolError> {
    let mut value: i32 = 0;

    for (read, &current) in bytes.iter().enumerate().take(MAX_VARINT_LEN) {
        value |= i32::from(current & SEGMENT_BITS) << (7 * read);

        if current & CONTINUE_BIT == 0 {
            return Ok((value, read + 1));
        }
    }

    Err(ProtocolError::InvalidVarInt)
}

#[cfg(test)]
mod tests {
    use super::{decode_varint, encode_varint, MAX_VARINT_LEN};

    fn cases() -> Vec<(i32, &'static [u8])> {
        vec![
            (0, b"\x00".as_slice()),
            (1, b"\x01"),
            (2, b"\x02"),
            (127, b"\x7f"),
            (128, b"\x80\x01"),
            (255, b"\xff\x01"),
            (25565, b"\xdd\xc7\x01"),
            (2_097_151, b"\xff\xff\x7f"),
            (i32::MAX, b"\xff\xff\xff\xff\x07"),
            (-1, b"\xff\xff\xff\xff\x0f"),
            (i32::MIN, b"\x80\x80\x80\x80\x08"),
        ]
    }

    #[test]
    fn test_encode() {
        for (value, expected) in cases() {
            let encoded = encode_varint(value);
            assert_eq!(&encoded[..], expected, "encoding {value}");
        }
    }

    #[test]
    fn test_decode() {
        for (expected, bytes) in cases() {
            let (value, consumed) = decode_varint(bytes).unwrap();
            assert_eq!(value, expected);
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn test_round_trip() {
        let samples = [0, 1, 7, 127, 128, 300, 25565, 1 << 20, i32::MAX];

        for value in samples {
            let encoded = encode_varint(value);
            let (decoded, consumed) = decode_varint(&encoded).unwrap();

            assert_eq!(decoded, value);
            assert_eq!(consumed, encoded.len());
            assert!(consumed <= MAX_VARINT_LEN);
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let (value, consumed) = decode_varint(b"\xdd\xc7\x01junk").unwrap();
        assert_eq!(value, 25565);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_decode_unterminated() {
        assert!(decode_varint(b"\xff\xff\xff\xff\xff\xff").is_err());
        assert!(decode_varint(b"\x80\x80").is_err());
        assert!(decode_varint(b"").is_err());
    }
}
