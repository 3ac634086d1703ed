//! Pluggable block compression codecs.
//!
//! Codecs are selected per block. The builder applies the acceptance
//! rule (compressed output must be at least 12.5% smaller than the raw
//! block) and falls back to uncompressed storage when a codec is
//! unavailable or unprofitable. At read time an unsupported type byte
//! is fatal: the payload is unrecoverable without the codec.

use crate::config::CompressionType;
use crate::error::{Error, Result};

/// Compresses `data` with the given codec.
///
/// Returns `None` when the codec performs no compression
/// ([`CompressionType::None`]).
pub fn compress(ty: CompressionType, data: &[u8]) -> Result<Option<Vec<u8>>> {
    match ty {
        CompressionType::None => Ok(None),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => {
            let compressed = snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::internal(format!("Snappy compression failed: {}", e)))?;
            Ok(Some(compressed))
        }
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => {
            let compressed = lz4::block::compress(data, None, true)
                .map_err(|e| Error::internal(format!("LZ4 compression failed: {}", e)))?;
            Ok(Some(compressed))
        }
    }
}

/// Decompresses a block payload per its trailer type byte.
pub fn decompress(ty: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match ty {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::corruption(format!("Snappy decompression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| Error::corruption(format!("LZ4 decompression failed: {}", e))),
    }
}
