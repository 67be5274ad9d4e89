//! Base64-JSON header codecs shared by the facilitator, the middleware, and clients.
//!
//! `spec.md` §4.H: `encodePaymentSignatureHeader(payload) = base64(JSON(payload))`, with
//! symmetric decode for `PAYMENT-REQUIRED` / `PAYMENT-RESPONSE`. Header names are
//! canonicalized case-insensitively by callers; this module only handles the
//! base64(JSON(_)) envelope.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum HeaderCodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a value as `base64(JSON(value))`.
pub fn encode<T: Serialize>(value: &T) -> Result<String, HeaderCodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(B64.encode(json))
}

/// Decodes a `base64(JSON(value))` string back into a value.
pub fn decode<T: DeserializeOwned>(header_value: &str) -> Result<T, HeaderCodecError> {
    let bytes = B64.decode(header_value.trim())?;
    let value = serde_json::from_slice(&bytes)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn encode_decode_is_identity() {
        let sample = Sample {
            a: 42,
            b: "hello".into(),
        };
        let encoded = encode(&sample).unwrap();
        let decoded: Sample = decode(&encoded).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result: Result<Sample, _> = decode("not-base64-!!!");
        assert!(result.is_err());
    }
}
