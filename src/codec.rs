//! Binary codec for canonical payload bytes.
//!
//! Encapsulates the bincode configuration so every byte string two parties
//! sign (or a store round-trips) is produced the same way. Fixed-size
//! integer encoding keeps the output deterministic across platforms, which
//! matters because both parties must sign identical bytes for the same
//! placement.

use serde::{de::DeserializeOwned, Serialize};

use crate::{ChannelError, ChannelResult};

// Fixed-int encoding: deterministic sizes, no varint negotiation surprises.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Encodes a value into a new `Vec<u8>`.
///
/// # Examples
///
/// ```
/// let bytes = turnpike::codec::encode(&42u32).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode<T: Serialize>(value: &T) -> ChannelResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| ChannelError::Serialization {
        context: format!("encoding: {e}"),
    })
}

/// Decodes a value from a byte slice, ignoring trailing bytes.
///
/// # Examples
///
/// ```
/// let bytes = turnpike::codec::encode(&42u32).unwrap();
/// let decoded: u32 = turnpike::codec::decode_value(&bytes).unwrap();
/// assert_eq!(decoded, 42);
/// ```
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> ChannelResult<T> {
    bincode::serde::decode_from_slice(bytes, config())
        .map(|(value, _)| value)
        .map_err(|e| ChannelError::Serialization {
            context: format!("decoding: {e}"),
        })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_primitive() {
        let bytes = encode(&12_345u32).unwrap();
        let decoded: u32 = decode_value(&bytes).unwrap();
        assert_eq!(decoded, 12_345);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode(&(7u64, "turn")).unwrap();
        let b = encode(&(7u64, "turn")).unwrap();
        assert_eq!(a, b, "both parties must sign identical bytes");
    }

    #[test]
    fn test_decode_invalid_data_reports_context() {
        let result: ChannelResult<u64> = decode_value(&[0xFF]);
        match result {
            Err(ChannelError::Serialization { context }) => {
                assert!(context.starts_with("decoding"));
            },
            other => panic!("expected serialization error, got {other:?}"),
        }
    }
}
