//! Per-chunk content hashing and compression.
//!
//! Chunks are hashed with 64-bit FNV-1a and compressed individually with
//! single-shot zlib deflate at the best-speed level. Per-chunk rather than
//! per-stream compression keeps every chunk self-contained for the delta
//! path, at a modest ratio cost.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// FNV-1a 64 offset basis. Hashing the empty input yields exactly this value.
pub const FNV1A_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64 prime.
pub const FNV1A_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Errors from the chunk codec.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The deflate stream reported an error.
    #[error("chunk compression failed: {0}")]
    Compress(#[from] flate2::CompressError),
    /// The inflate stream reported an error (corrupt input).
    #[error("chunk decompression failed: {0}")]
    Decompress(#[from] flate2::DecompressError),
    /// The output buffer was too small for the chunk.
    #[error("chunk did not fit the output buffer")]
    OutputFull,
}

/// 64-bit FNV-1a over the exact byte range.
#[must_use]
pub fn hash(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV1A_OFFSET, |acc, &byte| {
        (acc ^ u64::from(byte)).wrapping_mul(FNV1A_PRIME)
    })
}

/// Single-shot deflate of one chunk into a pre-sized buffer.
///
/// Returns the compressed length. Callers size `dst` at twice the chunk size,
/// which guarantees headroom even for pathological incompressible input.
pub fn compress(src: &[u8], dst: &mut [u8]) -> Result<usize, ChunkError> {
    let mut deflate = Compress::new(Compression::fast(), true);
    let status = deflate.compress(src, dst, FlushCompress::Finish)?;
    match status {
        Status::StreamEnd => Ok(usize::try_from(deflate.total_out()).unwrap_or(usize::MAX)),
        Status::Ok | Status::BufError => Err(ChunkError::OutputFull),
    }
}

/// Single-shot inflate of one chunk into a pre-sized buffer.
///
/// Returns the decompressed length. Accepts payloads produced by the
/// partner's compressor at any level.
pub fn decompress(src: &[u8], dst: &mut [u8]) -> Result<usize, ChunkError> {
    let mut inflate = Decompress::new(true);
    let status = inflate.decompress(src, dst, FlushDecompress::Finish)?;
    match status {
        Status::StreamEnd => Ok(usize::try_from(inflate.total_out()).unwrap_or(usize::MAX)),
        Status::Ok | Status::BufError => Err(ChunkError::OutputFull),
    }
}

#[cfg(test)]
mod tests {
    use super::{compress, decompress, hash, ChunkError, FNV1A_OFFSET};
    use flate2::Compression;
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_of_empty_is_offset_basis() {
        assert_eq!(hash(b""), FNV1A_OFFSET);
    }

    #[test]
    fn hash_matches_known_vectors() {
        // Published FNV-1a 64 test vectors.
        assert_eq!(hash(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(hash(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn hash_is_position_sensitive() {
        assert_ne!(hash(b"ab"), hash(b"ba"));
    }

    fn round_trip(chunk: &[u8]) {
        let mut packed = vec![0u8; chunk.len() * 2 + 64];
        let packed_len = compress(chunk, &mut packed).unwrap();
        let mut plain = vec![0u8; chunk.len() + 1];
        let plain_len = decompress(&packed[..packed_len], &mut plain).unwrap();
        assert_eq!(plain_len, chunk.len());
        assert_eq!(&plain[..plain_len], chunk);
    }

    #[test]
    fn compressible_round_trip() {
        round_trip(&b"abcdefgh".repeat(4096));
    }

    #[test]
    fn incompressible_round_trip() {
        // Deterministic pseudo-random bytes; no useful redundancy.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let noise: Vec<u8> = (0..65_536)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                (state >> 33) as u8
            })
            .collect();
        round_trip(&noise);
    }

    #[test]
    fn decompress_accepts_other_levels() {
        let chunk = b"the same bytes at the best ratio".repeat(128);
        let mut deflate = flate2::Compress::new(Compression::best(), true);
        let mut packed = vec![0u8; chunk.len() * 2 + 64];
        let status = deflate
            .compress(&chunk, &mut packed, flate2::FlushCompress::Finish)
            .unwrap();
        assert_eq!(status, flate2::Status::StreamEnd);
        let packed_len = usize::try_from(deflate.total_out()).unwrap();

        let mut plain = vec![0u8; chunk.len()];
        let plain_len = decompress(&packed[..packed_len], &mut plain).unwrap();
        assert_eq!(&plain[..plain_len], &chunk[..]);
    }

    #[test]
    fn undersized_output_is_reported() {
        let chunk = b"0123456789".repeat(100);
        let mut tiny = [0u8; 4];
        assert!(matches!(
            compress(&chunk, &mut tiny),
            Err(ChunkError::OutputFull)
        ));
    }
}
