//! Node content and its pluggable codec
//!
//! The engine only compares content for equality. Persistence goes through a
//! [`ContentCodec`], which sees the node's context (its id and parent id).

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Opaque application payload carried by content nodes
pub trait Content: Clone + PartialEq + fmt::Debug {}

impl<T: Clone + PartialEq + fmt::Debug> Content for T {}

/// Where a piece of content sits in its tree
#[derive(Debug, Clone, Copy)]
pub struct CodecContext<'a, K> {
    pub id: &'a K,
    pub parent: Option<&'a K>,
}

/// Maps node content to and from its stored form
pub trait ContentCodec<K, C> {
    fn encode(&self, ctx: &CodecContext<'_, K>, content: &C) -> Result<Vec<u8>>;

    fn decode(&self, ctx: &CodecContext<'_, K>, data: &[u8]) -> Result<C>;
}

/// Codec for any serde content, using bincode
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<K, C> ContentCodec<K, C> for BincodeCodec
where
    K: fmt::Display,
    C: Serialize + DeserializeOwned,
{
    fn encode(&self, ctx: &CodecContext<'_, K>, content: &C) -> Result<Vec<u8>> {
        bincode::serialize(content)
            .map_err(|e| Error::Codec(format!("Failed to encode content of {}: {}", ctx.id, e)))
    }

    fn decode(&self, ctx: &CodecContext<'_, K>, data: &[u8]) -> Result<C> {
        bincode::deserialize(data)
            .map_err(|e| Error::Codec(format!("Failed to decode content of {}: {}", ctx.id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StringKey;

    #[test]
    fn test_bincode_codec_reports_node() {
        let id = StringKey::new("file.txt");
        let ctx = CodecContext { id: &id, parent: None };
        let data = ContentCodec::<StringKey, String>::encode(&BincodeCodec, &ctx, &"hello".to_string())
            .unwrap();
        let back: String =
            ContentCodec::<StringKey, String>::decode(&BincodeCodec, &ctx, &data).unwrap();
        assert_eq!(back, "hello");

        let err = ContentCodec::<StringKey, String>::decode(&BincodeCodec, &ctx, &[0xff]).unwrap_err();
        assert!(err.to_string().contains("file.txt"));
    }
}
