//! Bincode Codec using `bincode`
//!
//! Compact binary encoding. Not self-describing: values written with one struct
//! layout cannot be read back after fields are added or reordered.

use crate::error::{Result, StoreError};
use crate::traits::CacheCodec;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Bincode Codec using `bincode`
#[cfg_attr(docsrs, doc(cfg(feature = "bincode")))]
#[derive(Debug, Default, Clone)]
pub struct BincodeCodec;

impl CacheCodec for BincodeCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "bincode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_truncation() {
        let codec = BincodeCodec;
        let value = ("session".to_string(), 1800_u64, vec![true, false]);
        let bytes = codec.serialize(&value).unwrap();
        let decoded: (String, u64, Vec<bool>) = codec.deserialize(&bytes).unwrap();
        assert_eq!(decoded, value);

        let result: Result<(String, u64, Vec<bool>)> = codec.deserialize(&bytes[..3]);
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }
}
