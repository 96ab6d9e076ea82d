//! Subblock compression codecs for rejection map channel data
//!
//! XDRZ stores large binary payloads as sequences of independently
//! compressed subblocks, each carrying its declared uncompressed size so a
//! reader can validate the decompressed byte count. Three codecs are named
//! by the format: LZ4, LZ4-HC and zlib. LZ4-HC produces standard LZ4 block
//! streams, so both decompress through the same path; the writer only ever
//! emits plain LZ4 (the fast path) or falls back to uncompressed output
//! when compression is unprofitable.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Maximum uncompressed byte count per subblock.
pub const MAX_SUBBLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Compression codecs named by the XDRZ format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    /// LZ4 fast compression.
    Lz4,
    /// LZ4 high-compression variant (decompresses as plain LZ4).
    Lz4Hc,
    /// zlib (DEFLATE with zlib framing).
    Zlib,
}

impl CompressionCodec {
    /// Resolve a codec from its `compression` attribute spelling.
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "lz4" => Some(CompressionCodec::Lz4),
            "lz4hc" => Some(CompressionCodec::Lz4Hc),
            "zlib" => Some(CompressionCodec::Zlib),
            _ => None,
        }
    }

    /// The codec's `compression` attribute spelling.
    pub fn attribute_name(&self) -> &'static str {
        match self {
            CompressionCodec::Lz4 => "lz4",
            CompressionCodec::Lz4Hc => "lz4hc",
            CompressionCodec::Zlib => "zlib",
        }
    }
}

/// One compressed chunk of a larger buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subblock {
    /// Byte count of the chunk before compression.
    pub uncompressed_size: usize,
    /// Compressed payload.
    pub data: Vec<u8>,
}

/// Errors raised by the subblock codecs.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// zlib stream error.
    #[error("zlib error: {0}")]
    Zlib(#[from] std::io::Error),

    /// LZ4 block decoding error.
    #[error("LZ4 decompression error: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),

    /// Decompressed byte count does not match the declared size.
    #[error("Invalid subblock: expected {expected} uncompressed bytes, got {actual}")]
    SizeMismatch {
        /// Declared uncompressed size.
        expected: usize,
        /// Byte count actually produced.
        actual: usize,
    },
}

/// Compress `data` into subblocks. Returns `None` when compression is
/// unprofitable (the compressed output would be no smaller than the input),
/// in which case the caller stores the data uncompressed.
pub fn compress(codec: CompressionCodec, data: &[u8]) -> Option<Vec<Subblock>> {
    if data.is_empty() {
        return None;
    }
    let mut subblocks = Vec::new();
    let mut compressed_total = 0usize;
    for chunk in data.chunks(MAX_SUBBLOCK_SIZE) {
        let compressed = match codec {
            CompressionCodec::Lz4 | CompressionCodec::Lz4Hc => lz4_flex::block::compress(chunk),
            CompressionCodec::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(chunk).ok()?;
                encoder.finish().ok()?
            }
        };
        compressed_total += compressed.len();
        subblocks.push(Subblock {
            uncompressed_size: chunk.len(),
            data: compressed,
        });
    }
    if compressed_total >= data.len() {
        return None;
    }
    Some(subblocks)
}

/// Decompress a subblock sequence back into one contiguous buffer. Each
/// subblock must decompress to exactly its declared size.
pub fn uncompress(
    codec: CompressionCodec,
    subblocks: &[Subblock],
) -> Result<Vec<u8>, CompressionError> {
    let total: usize = subblocks.iter().map(|s| s.uncompressed_size).sum();
    let mut out = Vec::with_capacity(total);
    for subblock in subblocks {
        let chunk = match codec {
            CompressionCodec::Lz4 | CompressionCodec::Lz4Hc => {
                lz4_flex::block::decompress(&subblock.data, subblock.uncompressed_size)?
            }
            CompressionCodec::Zlib => {
                let mut decoder = ZlibDecoder::new(&subblock.data[..]);
                let mut chunk = Vec::with_capacity(subblock.uncompressed_size);
                decoder.read_to_end(&mut chunk)?;
                chunk
            }
        };
        if chunk.len() != subblock.uncompressed_size {
            return Err(CompressionError::SizeMismatch {
                expected: subblock.uncompressed_size,
                actual: chunk.len(),
            });
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressible_data() -> Vec<u8> {
        // Long runs compress well under every codec.
        let mut data = vec![0u8; 4096];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i / 256) as u8;
        }
        data
    }

    #[test]
    fn test_lz4_round_trip() {
        let data = compressible_data();
        let subblocks = compress(CompressionCodec::Lz4, &data).unwrap();
        assert!(!subblocks.is_empty());
        let restored = uncompress(CompressionCodec::Lz4, &subblocks).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_zlib_round_trip() {
        let data = compressible_data();
        let subblocks = compress(CompressionCodec::Zlib, &data).unwrap();
        let restored = uncompress(CompressionCodec::Zlib, &subblocks).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_lz4hc_decompresses_lz4_blocks() {
        let data = compressible_data();
        let subblocks = compress(CompressionCodec::Lz4, &data).unwrap();
        let restored = uncompress(CompressionCodec::Lz4Hc, &subblocks).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_unprofitable_compression_declined() {
        // Incompressible noise: every byte distinct from its neighbors.
        let data: Vec<u8> = (0..257u32).map(|i| (i.wrapping_mul(97) % 251) as u8).collect();
        assert!(compress(CompressionCodec::Lz4, &data).is_none());
    }

    #[test]
    fn test_empty_input_declined() {
        assert!(compress(CompressionCodec::Lz4, &[]).is_none());
    }

    #[test]
    fn test_size_mismatch_detected() {
        let data = compressible_data();
        let mut subblocks = compress(CompressionCodec::Lz4, &data).unwrap();
        subblocks[0].uncompressed_size -= 1;
        assert!(uncompress(CompressionCodec::Lz4, &subblocks).is_err());
    }

    #[test]
    fn test_codec_attribute_names() {
        for codec in [CompressionCodec::Lz4, CompressionCodec::Lz4Hc, CompressionCodec::Zlib] {
            assert_eq!(CompressionCodec::from_attribute(codec.attribute_name()), Some(codec));
        }
        assert_eq!(CompressionCodec::from_attribute("zstd"), None);
    }
}
