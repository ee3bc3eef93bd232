//! Serialization Codec Module
//!
//! Converts cached values to and from the string form kept in storage.
//! The default codec is JSON; any `Codec<V>` can replace it, e.g. one that
//! compresses the JSON before it reaches a small storage quota.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

// == Codec Trait ==
/// A `stringify`/`parse` pair for values of type `V`.
pub trait Codec<V>: Send + Sync {
    /// Serializes a value into its persisted representation.
    fn stringify(&self, value: &V) -> Result<String>;

    /// Rebuilds a value from its persisted representation.
    fn parse(&self, raw: &str) -> Result<V>;
}

// == JSON Codec ==
/// Lossless JSON codec using serde_json.
pub struct JsonCodec<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Codec<V> for JsonCodec<V>
where
    V: Serialize + DeserializeOwned,
{
    fn stringify(&self, value: &V) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn parse(&self, raw: &str) -> Result<V> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Response {
        status: u16,
        body: String,
    }

    #[test]
    fn test_json_codec_strings_are_quoted() {
        let codec = JsonCodec::<String>::new();
        assert_eq!(codec.stringify(&"value".to_string()).unwrap(), "\"value\"");
    }

    #[test]
    fn test_json_codec_structs() {
        let codec = JsonCodec::<Response>::new();
        let raw = r#"{"status":200,"body":"ok"}"#;

        let parsed = codec.parse(raw).unwrap();
        assert_eq!(
            parsed,
            Response {
                status: 200,
                body: "ok".to_string()
            }
        );
        assert_eq!(codec.stringify(&parsed).unwrap(), raw);
    }

    #[test]
    fn test_json_codec_rejects_malformed_input() {
        let codec = JsonCodec::<Response>::new();
        assert!(matches!(
            codec.parse("{\"status\":"),
            Err(CacheError::Serialization(_))
        ));
    }
}
