use std::io::{self, Read};

use flate2::read::ZlibDecoder;

/// Inflates the payload of a compressed save.
///
/// Implementations must fail rather than return a buffer whose length
/// differs from `expected_len`.
pub trait Decompressor {
    fn decompress(&self, packed: &[u8], expected_len: usize) -> io::Result<Vec<u8>>;
}

/// Used when no codec is available. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecompressor;

impl Decompressor for NoDecompressor {
    fn decompress(&self, packed: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!(
                "save is compressed ({} bytes packed, {expected_len} unpacked) and no decompressor is configured",
                packed.len()
            ),
        ))
    }
}

/// zlib stream payloads, as produced by repacking tools and test fixtures.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(&self, packed: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(packed);
        let mut out = Vec::with_capacity(expected_len);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("zlib decode failed: {e}")))?;
        if out.len() != expected_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "decompressed size mismatch: expected {}, got {}",
                    expected_len,
                    out.len()
                ),
            ));
        }
        Ok(out)
    }
}
