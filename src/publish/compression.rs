//! The recognized `contentEncoding` compression algorithms, applied to a
//! publisher's JSON-serialized body and reversed on the consumer side.

use crate::error::TechnicalError;
use std::io::{Read, Write};

/// A compression algorithm recognized in `contentEncoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// `gzip`.
    Gzip,
    /// `deflate` (zlib-wrapped).
    Deflate,
    /// `br` (Brotli).
    Brotli,
}

impl Compression {
    /// The literal `contentEncoding` value this algorithm is published under.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Deflate => "deflate",
            Compression::Brotli => "br",
        }
    }

    /// Parses a `contentEncoding` header value, returning `None` for any
    /// value outside the recognized set (including absence of compression).
    pub fn from_wire_str(value: &str) -> Option<Self> {
        match value {
            "gzip" => Some(Compression::Gzip),
            "deflate" => Some(Compression::Deflate),
            "br" => Some(Compression::Brotli),
            _ => None,
        }
    }

    /// Compresses `bytes`.
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, TechnicalError> {
        match self {
            Compression::Gzip => {
                use flate2::write::GzEncoder;
                use flate2::Compression as Level;

                let mut encoder = GzEncoder::new(Vec::new(), Level::default());
                encoder
                    .write_all(bytes)
                    .map_err(|error| TechnicalError::wrap("gzip compression failed", error))?;
                encoder
                    .finish()
                    .map_err(|error| TechnicalError::wrap("gzip compression failed", error))
            }
            Compression::Deflate => {
                use flate2::write::ZlibEncoder;
                use flate2::Compression as Level;

                let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
                encoder
                    .write_all(bytes)
                    .map_err(|error| TechnicalError::wrap("deflate compression failed", error))?;
                encoder
                    .finish()
                    .map_err(|error| TechnicalError::wrap("deflate compression failed", error))
            }
            Compression::Brotli => {
                let mut output = Vec::new();
                let mut input = bytes;
                brotli::BrotliCompress(&mut input, &mut output, &brotli::enc::BrotliEncoderParams::default())
                    .map_err(|error| TechnicalError::wrap("brotli compression failed", error))?;
                Ok(output)
            }
        }
    }

    /// Decompresses `bytes`, the inverse of [`compress`](Self::compress).
    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, TechnicalError> {
        match self {
            Compression::Gzip => {
                use flate2::read::GzDecoder;

                let mut decoder = GzDecoder::new(bytes);
                let mut output = Vec::new();
                decoder
                    .read_to_end(&mut output)
                    .map_err(|error| TechnicalError::wrap("gzip decompression failed", error))?;
                Ok(output)
            }
            Compression::Deflate => {
                use flate2::read::ZlibDecoder;

                let mut decoder = ZlibDecoder::new(bytes);
                let mut output = Vec::new();
                decoder
                    .read_to_end(&mut output)
                    .map_err(|error| TechnicalError::wrap("deflate decompression failed", error))?;
                Ok(output)
            }
            Compression::Brotli => {
                let mut output = Vec::new();
                let mut input = bytes;
                brotli::BrotliDecompress(&mut input, &mut output)
                    .map_err(|error| TechnicalError::wrap("brotli decompression failed", error))?;
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(compression: Compression) {
        // Given
        let payload = br#"{"order_id":"abc-123","amount":4200}"#.to_vec();

        // When
        let compressed = compression.compress(&payload).unwrap();
        let restored = compression.decompress(&compressed).unwrap();

        // Then
        assert_eq!(restored, payload);
    }

    #[test]
    fn gzip_round_trips() {
        round_trip(Compression::Gzip);
    }

    #[test]
    fn deflate_round_trips() {
        round_trip(Compression::Deflate);
    }

    #[test]
    fn brotli_round_trips() {
        round_trip(Compression::Brotli);
    }

    #[test]
    fn unrecognized_content_encoding_is_not_a_compression_algorithm() {
        // Given / When
        let actual = Compression::from_wire_str("identity");

        // Then
        assert_eq!(actual, None);
    }

    #[test]
    fn wire_str_round_trips_through_from_wire_str() {
        // Given
        let compression = Compression::Brotli;

        // When
        let actual = Compression::from_wire_str(compression.as_wire_str());

        // Then
        assert_eq!(actual, Some(compression));
    }
}
