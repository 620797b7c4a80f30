//! Base64 and hex codecs for transport fields.
//!
//! Every decoding failure maps to `MalformedInput` naming the field, so bad
//! encodings are rejected before any primitive is invoked.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use zkshare_common::{Error, Result};

/// Encode bytes as standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a standard base64 field.
pub fn decode_base64(value: &str, field: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::MalformedInput(format!("{} is empty", field)));
    }
    STANDARD
        .decode(trimmed)
        .map_err(|e| Error::MalformedInput(format!("{} is not valid base64: {}", field, e)))
}

/// Decode a base64 field that must have an exact byte length.
pub fn decode_base64_exact<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = decode_base64(value, field)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        Error::MalformedInput(format!(
            "{} must be {} bytes, got {}",
            field,
            N,
            bytes.len()
        ))
    })
}

/// Decode a hex field.
pub fn decode_hex(value: &str, field: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| Error::MalformedInput(format!("{} is not valid hex: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let encoded = encode_base64(b"zero knowledge");
        assert_eq!(decode_base64(&encoded, "field").unwrap(), b"zero knowledge");
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(matches!(
            decode_base64("not*base64!", "nonce"),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(decode_base64("", "nonce"), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_decode_exact_length() {
        let twelve = encode_base64(&[1u8; 12]);
        let nonce: [u8; 12] = decode_base64_exact(&twelve, "nonce").unwrap();
        assert_eq!(nonce, [1u8; 12]);

        let eleven = encode_base64(&[1u8; 11]);
        assert!(decode_base64_exact::<12>(&eleven, "nonce").is_err());
    }
}
