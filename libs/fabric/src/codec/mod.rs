use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use courier_core::Result;

pub mod json;

pub use self::json::JsonCodec;

/// Codec trait for marshalling message bodies through their text form
pub trait Codec: Send + Sync {
    /// Encode a value into its canonical text
    fn encode<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Decode text into a value
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T>;

    /// Round-trip a value through its text form into a structured body
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Value> {
        let text = self.encode(value)?;
        self.decode(&text)
    }
}
