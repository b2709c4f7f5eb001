use crate::error::SrError;
use crate::schema::SchemaId;

/// First byte of every registry-encoded payload.
pub const MAGIC_BYTE: u8 = 0x00;

/// Magic byte + 4-byte schema ID.
pub const HEADER_LEN: usize = 5;

/// A decoded envelope. `payload` borrows from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub schema_id: SchemaId,
    pub payload: &'a [u8],
}

/// Wrap `payload` as `[0x00][id: u32 BE][payload]`.
pub fn encode_envelope(schema_id: SchemaId, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    encode_envelope_into(schema_id, payload, &mut buf);
    buf
}

/// Append an envelope to `buf`.
pub fn encode_envelope_into(schema_id: SchemaId, payload: &[u8], buf: &mut Vec<u8>) {
    buf.reserve(HEADER_LEN + payload.len());
    buf.push(MAGIC_BYTE);
    buf.extend_from_slice(&schema_id.get().to_be_bytes());
    buf.extend_from_slice(payload);
}

/// Split an envelope into schema ID and payload.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope<'_>, SrError> {
    if bytes.len() < HEADER_LEN {
        return Err(SrError::MalformedEnvelope(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(SrError::MalformedEnvelope(format!(
            "invalid magic byte: expected 0x{MAGIC_BYTE:02x}, got 0x{:02x}",
            bytes[0]
        )));
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok(Envelope {
        schema_id: SchemaId(id),
        payload: &bytes[HEADER_LEN..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_layout_is_big_endian() {
        let buf = encode_envelope(SchemaId(0x0102_0304), b"xy");
        assert_eq!(buf, [0x00, 0x01, 0x02, 0x03, 0x04, b'x', b'y']);
    }

    #[test]
    fn empty_payload_is_valid() {
        let env = decode_envelope(&[0, 0, 0, 0, 7]).unwrap();
        assert_eq!(env.schema_id, SchemaId(7));
        assert!(env.payload.is_empty());
    }

    #[test]
    fn encode_into_appends() {
        let mut buf = b"prefix".to_vec();
        encode_envelope_into(SchemaId(1), b"p", &mut buf);
        assert_eq!(&buf[..6], b"prefix");
        assert_eq!(decode_envelope(&buf[6..]).unwrap().payload, b"p");
    }

    proptest! {
        #[test]
        fn envelope_round_trip(id in any::<u32>(), payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let buf = encode_envelope(SchemaId(id), &payload);
            prop_assert_eq!(buf.len(), HEADER_LEN + payload.len());
            let env = decode_envelope(&buf).unwrap();
            prop_assert_eq!(env.schema_id, SchemaId(id));
            prop_assert_eq!(env.payload, &payload[..]);
        }

        #[test]
        fn short_buffers_are_rejected(buf in proptest::collection::vec(any::<u8>(), 0..HEADER_LEN)) {
            let err = decode_envelope(&buf).unwrap_err();
            prop_assert_eq!(err.code(), "MALFORMED_ENVELOPE");
        }

        #[test]
        fn wrong_magic_is_rejected(
            magic in 1u8..=255,
            rest in proptest::collection::vec(any::<u8>(), 4..64),
        ) {
            let mut buf = vec![magic];
            buf.extend_from_slice(&rest);
            let err = decode_envelope(&buf).unwrap_err();
            prop_assert_eq!(err.code(), "MALFORMED_ENVELOPE");
        }
    }
}
