//! Serialization of fitted estimator state.
//!
//! Fitted backends are dumped to an opaque byte blob with their native
//! encoding (bincode) and embedded in JSON documents as base64 text. The core
//! never looks inside a blob; it only moves it through these primitives.
//!
//! Failures on the write path are [`PowertrainError::Serialization`], on the
//! read path [`PowertrainError::Deserialization`].

use crate::error::{PowertrainError, Result};
use base64::prelude::*;
use serde::Serialize;

/// Parameter representations that can be dumped to and restored from bytes.
///
/// Implementors should contain only plain data (vectors, scalars, maps) so
/// that a restored value predicts bit-identically to the original.
pub trait SerializableParams: Sized {
    /// Dump the parameters to a byte buffer.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Restore the parameters from a byte buffer.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

impl<T> SerializableParams for T
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| PowertrainError::Serialization(format!("cannot encode parameters: {e}")))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Dump `params` and wrap the bytes as base64 text.
pub fn encode_blob<T: SerializableParams>(params: &T) -> Result<String> {
    Ok(BASE64_STANDARD.encode(params.to_bytes()?))
}

/// Inverse of [`encode_blob`].
///
/// # Errors
/// [`PowertrainError::Deserialization`] if the text is not base64 or the bytes
/// do not decode as `T`.
pub fn decode_blob<T: SerializableParams>(text: &str) -> Result<T> {
    let bytes = BASE64_STANDARD
        .decode(text)
        .map_err(|e| PowertrainError::Deserialization(format!("invalid base64 blob: {e}")))?;
    T::from_bytes(&bytes)
}

pub(crate) fn to_json_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| PowertrainError::Serialization(e.to_string()))
}

pub(crate) fn to_json_string_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| PowertrainError::Serialization(e.to_string()))
}
