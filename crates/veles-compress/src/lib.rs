//! Compression block codec.
//!
//! Container formats store independently compressed blocks whose uncompressed
//! size is always declared up front in the surrounding metadata. This crate
//! decompresses one block given its declared scheme and size, and verifies
//! that the stream produced exactly the declared number of bytes — a size
//! mismatch is a corruption error, not a warning.
//!
//! The scheme tags used on the wire differ per format family; the mapping
//! from a format's tag word to a [`Scheme`] lives with each format reader.

mod error;

use std::io::Read;

use tracing::debug;

pub use error::{Error, Result};

/// A compression scheme a storage block may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Stored as-is.
    None,
    /// Legacy LZMA1: 5-byte properties header followed by the raw stream,
    /// with no embedded size field.
    Lzma,
    /// LZ4 block format.
    Lz4,
    /// LZ4 high-compression. Identical block format to LZ4 on decode.
    Lz4Hc,
    /// Zstandard frame.
    Zstd,
    /// zlib-wrapped DEFLATE.
    Deflate,
    /// gzip-wrapped DEFLATE.
    Gzip,
}

/// Decompress one block to exactly `expected_size` bytes.
pub fn decompress(scheme: Scheme, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    debug!(
        ?scheme,
        compressed = data.len(),
        expected = expected_size,
        "decompressing block"
    );
    let out = match scheme {
        Scheme::None => {
            if data.len() != expected_size {
                return Err(Error::SizeMismatch {
                    scheme,
                    expected: expected_size,
                    actual: data.len(),
                });
            }
            data.to_vec()
        }
        Scheme::Lz4 | Scheme::Lz4Hc => lz4_flex::block::decompress(data, expected_size)
            .map_err(|e| Error::Corrupt {
                scheme,
                message: e.to_string(),
            })?,
        Scheme::Lzma => decompress_lzma(data, expected_size)?,
        Scheme::Zstd => {
            let decoder = zstd::Decoder::new(data).map_err(|e| Error::Corrupt {
                scheme,
                message: e.to_string(),
            })?;
            read_exactly(scheme, decoder, expected_size)?
        }
        Scheme::Deflate => {
            read_exactly(scheme, flate2::read::ZlibDecoder::new(data), expected_size)?
        }
        Scheme::Gzip => read_exactly(scheme, flate2::read::GzDecoder::new(data), expected_size)?,
    };
    if out.len() != expected_size {
        return Err(Error::SizeMismatch {
            scheme,
            expected: expected_size,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Drain a decoder, reading at most one byte past the expected size so an
/// oversized stream is detected without letting hostile input balloon the
/// allocation.
fn read_exactly<R: Read>(scheme: Scheme, decoder: R, expected_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .take(expected_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::Corrupt {
            scheme,
            message: e.to_string(),
        })?;
    Ok(out)
}

/// Decompress a headerless LZMA1 stream.
///
/// The block stores only the 5-byte properties (lc/lp/pb byte + u32
/// dictionary size); the uncompressed size comes from the block table. The
/// stream is handed to liblzma by synthesizing the 13-byte lzma-alone header
/// from those properties plus the declared size.
fn decompress_lzma(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if data.len() < 5 {
        return Err(Error::Corrupt {
            scheme: Scheme::Lzma,
            message: format!("stream too short for properties: {} bytes", data.len()),
        });
    }
    // props = (pb * 5 + lp) * 9 + lc, all three bounded.
    if data[0] >= 9 * 5 * 5 {
        return Err(Error::BadLzmaProperties(data[0]));
    }

    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&data[..5]);
    header.extend_from_slice(&(expected_size as u64).to_le_bytes());

    let reader = std::io::Cursor::new(header).chain(&data[5..]);
    let stream =
        xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(|e| Error::Corrupt {
            scheme: Scheme::Lzma,
            message: e.to_string(),
        })?;
    let decoder = xz2::read::XzDecoder::new_stream(reader, stream);
    read_exactly(Scheme::Lzma, decoder, expected_size)
}
