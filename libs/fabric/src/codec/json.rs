use serde::de::DeserializeOwned;
use serde::Serialize;

use courier_core::Result;

use crate::codec::Codec;

/// JSON codec producing canonical text.
///
/// Object keys come out sorted, so equal values always encode to the same
/// text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        // Going through Value sorts object keys
        let value = serde_json::to_value(value)?;
        Ok(serde_json::to_string(&value)?)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }
}
