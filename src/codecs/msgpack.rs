//! `MessagePack` Codec using `rmp-serde`

use crate::error::{Result, StoreError};
use crate::traits::CacheCodec;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// `MessagePack` Codec using `rmp-serde`
///
/// Structs are encoded as maps so stored values survive added optional fields.
#[cfg_attr(docsrs, doc(cfg(feature = "msgpack")))]
#[derive(Debug, Default, Clone)]
pub struct MsgpackCodec;

impl CacheCodec for MsgpackCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "rmp_serde"
    }
}
