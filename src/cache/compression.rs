//! Payload Compression
//!
//! Gzip compression of remote-tier payloads. Compressed bytes are base64
//! encoded so they can live in a text-oriented key-value store.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::compression::GzipCodec;
//!
//! let codec = GzipCodec::new();
//!
//! let data = br#"{"name":"Ann","roles":["admin","admin","admin"]}"#;
//! let encoded = codec.compress_to_base64(data).unwrap();
//!
//! let decoded = codec.decompress_from_base64(&encoded).unwrap();
//! assert_eq!(decoded.as_ref(), data);
//! ```

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Name reported in compression errors
const ALGORITHM: &str = "gzip";

/// Gzip codec for the `data` field of remote envelopes
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Create a codec with the default gzip level
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Gzip raw bytes
    pub fn compress(&self, data: &[u8]) -> Result<Bytes> {
        let to_error = |e: std::io::Error| Error::CompressionFailed {
            algorithm: ALGORITHM.into(),
            reason: e.to_string(),
        };

        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data).map_err(to_error)?;
        encoder.finish().map(Bytes::from).map_err(to_error)
    }

    /// Gunzip raw bytes
    pub fn decompress(&self, data: &[u8]) -> Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::DecompressionFailed {
                algorithm: ALGORITHM.into(),
                reason: e.to_string(),
            })?;
        Ok(Bytes::from(out))
    }

    /// Gzip and base64-encode for storage in a text store
    pub fn compress_to_base64(&self, data: &[u8]) -> Result<String> {
        let compressed = self.compress(data)?;
        Ok(BASE64.encode(&compressed))
    }

    /// Base64-decode and gunzip
    pub fn decompress_from_base64(&self, encoded: &str) -> Result<Bytes> {
        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| Error::DecompressionFailed {
                algorithm: "base64".into(),
                reason: e.to_string(),
            })?;
        self.decompress(&raw)
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// A JSON payload with enough repetition to shrink under gzip
    const TEST_DATA: &[u8] = br#"{"items":[{"id":1,"status":"active"},{"id":2,"status":"active"},{"id":3,"status":"active"},{"id":4,"status":"active"}]}"#;

    #[test]
    fn test_gzip_shrinks_repetitive_json() {
        let codec = GzipCodec::new();

        let compressed = codec.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());
        // gzip magic
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        assert_eq!(codec.decompress(&compressed).unwrap().as_ref(), TEST_DATA);
    }

    #[test]
    fn test_base64_is_text_safe() {
        let codec = GzipCodec::new();
        let encoded = codec.compress_to_base64(TEST_DATA).unwrap();
        assert!(encoded.is_ascii());

        let decoded = codec.decompress_from_base64(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), TEST_DATA);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let codec = GzipCodec::new();

        assert_matches!(
            codec.decompress_from_base64("not base64!!"),
            Err(Error::DecompressionFailed { algorithm, .. }) if algorithm == "base64"
        );

        let not_gzip = BASE64.encode(b"plain text");
        assert_matches!(
            codec.decompress_from_base64(&not_gzip),
            Err(Error::DecompressionFailed { algorithm, .. }) if algorithm == "gzip"
        );
    }
}
