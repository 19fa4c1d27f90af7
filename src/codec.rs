//! Serialization Pipeline
//!
//! Encodes values into the L2 envelope `[1 byte flag][payload]` and back.
//! The flag names both the format and whether the payload is zstd-compressed,
//! so decoding never has to guess.

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::policy::{CachePolicy, SerializationFormat};

// == Envelope Flag ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeFlag {
    JsonRaw = 0x01,
    JsonCompressed = 0x02,
    BinaryRaw = 0x03,
    BinaryCompressed = 0x04,
}

impl EnvelopeFlag {
    pub fn new(format: SerializationFormat, compressed: bool) -> Self {
        match (format, compressed) {
            (SerializationFormat::Json, false) => EnvelopeFlag::JsonRaw,
            (SerializationFormat::Json, true) => EnvelopeFlag::JsonCompressed,
            (SerializationFormat::Binary, false) => EnvelopeFlag::BinaryRaw,
            (SerializationFormat::Binary, true) => EnvelopeFlag::BinaryCompressed,
        }
    }

    pub fn format(self) -> SerializationFormat {
        match self {
            EnvelopeFlag::JsonRaw | EnvelopeFlag::JsonCompressed => SerializationFormat::Json,
            EnvelopeFlag::BinaryRaw | EnvelopeFlag::BinaryCompressed => SerializationFormat::Binary,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, EnvelopeFlag::JsonCompressed | EnvelopeFlag::BinaryCompressed)
    }
}

impl TryFrom<u8> for EnvelopeFlag {
    type Error = CacheError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(EnvelopeFlag::JsonRaw),
            0x02 => Ok(EnvelopeFlag::JsonCompressed),
            0x03 => Ok(EnvelopeFlag::BinaryRaw),
            0x04 => Ok(EnvelopeFlag::BinaryCompressed),
            other => Err(CacheError::CorruptEnvelope(format!("unknown flag 0x{other:02x}"))),
        }
    }
}

// == Codec ==
/// Compression settings shared by every encode.
#[derive(Debug, Clone)]
pub struct Codec {
    /// Compressed form is kept only if smaller than `threshold * raw`
    threshold: f64,
    min_bytes: usize,
    zstd_level: i32,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            min_bytes: 512,
            zstd_level: 3,
        }
    }
}

impl Codec {
    pub fn new(threshold: f64, min_bytes: usize, zstd_level: i32) -> Self {
        Self {
            threshold,
            min_bytes,
            zstd_level,
        }
    }

    /// Encodes `value` per `policy` into an envelope.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T, policy: &CachePolicy) -> Result<Vec<u8>> {
        let format = policy.serialization_format;
        let raw = serialize(value, format)?;

        if policy.compression_enabled && raw.len() >= self.min_bytes {
            let compressed = zstd::encode_all(raw.as_slice(), self.zstd_level)
                .map_err(|e| CacheError::Compression(e.to_string()))?;
            if (compressed.len() as f64) < self.threshold * raw.len() as f64 {
                debug!(raw = raw.len(), compressed = compressed.len(), "payload compressed");
                return Ok(frame(EnvelopeFlag::new(format, true), &compressed));
            }
            debug!(raw = raw.len(), compressed = compressed.len(), "compression skipped, no gain");
        }

        Ok(frame(EnvelopeFlag::new(format, false), &raw))
    }

    /// Decodes an envelope produced by [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (&flag_byte, payload) = bytes
            .split_first()
            .ok_or_else(|| CacheError::CorruptEnvelope("empty payload".to_string()))?;
        let flag = EnvelopeFlag::try_from(flag_byte)?;

        if flag.is_compressed() {
            let raw =
                zstd::decode_all(payload).map_err(|e| CacheError::Compression(e.to_string()))?;
            deserialize(&raw, flag.format())
        } else {
            deserialize(payload, flag.format())
        }
    }
}

fn frame(flag: EnvelopeFlag, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(flag as u8);
    out.extend_from_slice(payload);
    out
}

fn serialize<T: Serialize + ?Sized>(value: &T, format: SerializationFormat) -> Result<Vec<u8>> {
    match format {
        SerializationFormat::Json => {
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
        }
        SerializationFormat::Binary => {
            rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
        }
    }
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8], format: SerializationFormat) -> Result<T> {
    match format {
        SerializationFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
        }
        SerializationFormat::Binary => {
            rmp_serde::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
        tags: Vec<String>,
        scores: HashMap<String, f64>,
    }

    fn profile() -> Profile {
        Profile {
            id: 7,
            name: "ada".to_string(),
            tags: vec!["a".into(), "b".into()],
            scores: HashMap::from([("x".to_string(), 0.5)]),
        }
    }

    fn policy(format: SerializationFormat, compression: bool) -> CachePolicy {
        CachePolicy::new("p", 60)
            .with_format(format)
            .with_compression(compression)
    }

    #[test]
    fn test_roundtrip_all_variants() {
        let codec = Codec::default();
        let value = profile();
        for format in [SerializationFormat::Json, SerializationFormat::Binary] {
            for compression in [false, true] {
                let bytes = codec.encode(&value, &policy(format, compression)).unwrap();
                let back: Profile = codec.decode(&bytes).unwrap();
                assert_eq!(back, value);
            }
        }
    }

    #[test]
    fn test_flag_marks_format() {
        let codec = Codec::default();
        let bytes = codec
            .encode(&profile(), &policy(SerializationFormat::Binary, false))
            .unwrap();
        assert_eq!(bytes[0], EnvelopeFlag::BinaryRaw as u8);

        let bytes = codec
            .encode(&profile(), &policy(SerializationFormat::Json, false))
            .unwrap();
        assert_eq!(bytes[0], EnvelopeFlag::JsonRaw as u8);
        assert_eq!(bytes[1], b'{');
    }

    #[test]
    fn test_compressible_payload_is_compressed() {
        let codec = Codec::default();
        let value = "repeat ".repeat(1000);
        let bytes = codec
            .encode(&value, &policy(SerializationFormat::Json, true))
            .unwrap();
        assert_eq!(bytes[0], EnvelopeFlag::JsonCompressed as u8);
        assert!(bytes.len() < value.len() / 2);

        let back: String = codec.decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_small_payload_skips_compression() {
        let codec = Codec::default();
        let bytes = codec
            .encode(&"tiny", &policy(SerializationFormat::Json, true))
            .unwrap();
        assert_eq!(bytes[0], EnvelopeFlag::JsonRaw as u8);
    }

    #[test]
    fn test_incompressible_payload_stored_raw() {
        // Pseudo-random bytes cannot shrink to a tenth of their encoded size.
        let mut state = 0x2545_f491_u32;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            })
            .collect();
        let codec = Codec::new(0.1, 16, 3);
        let bytes = codec
            .encode(&noise, &policy(SerializationFormat::Binary, true))
            .unwrap();
        assert_eq!(bytes[0], EnvelopeFlag::BinaryRaw as u8);
        let back: Vec<u8> = codec.decode(&bytes).unwrap();
        assert_eq!(back, noise);
    }

    #[test]
    fn test_decode_rejects_unknown_flag() {
        let codec = Codec::default();
        let result: Result<String> = codec.decode(&[0x7f, b'"', b'x', b'"']);
        assert!(matches!(result, Err(CacheError::CorruptEnvelope(_))));
    }

    #[test]
    fn test_decode_rejects_empty() {
        let codec = Codec::default();
        let result: Result<String> = codec.decode(&[]);
        assert!(matches!(result, Err(CacheError::CorruptEnvelope(_))));
    }

    #[test]
    fn test_decode_rejects_garbage_payload() {
        let codec = Codec::default();
        let result: Result<Profile> = codec.decode(&[EnvelopeFlag::JsonRaw as u8, b'{', b'!']);
        assert!(matches!(result, Err(CacheError::Serialization(_))));

        let result: Result<Profile> = codec.decode(&[EnvelopeFlag::JsonCompressed as u8, 1, 2, 3]);
        assert!(matches!(result, Err(CacheError::Compression(_))));
    }

    #[test]
    fn test_binary_decodes_as_json_value() {
        let codec = Codec::default();
        let bytes = codec
            .encode(&profile(), &policy(SerializationFormat::Binary, false))
            .unwrap();
        let value: serde_json::Value = codec.decode(&bytes).unwrap();
        assert_eq!(value["name"], "ada");
    }

    #[test]
    fn test_unserializable_value_fails() {
        // JSON object keys must be strings.
        let codec = Codec::default();
        let value: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        let result = codec.encode(&value, &policy(SerializationFormat::Json, false));
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
