//! Godot texture container headers.
//!
//! These are shallow, magic-keyed probes: enough of the header to surface
//! dimensions and format flags, with the pixel payload kept as raw bytes.
//! Actual pixel decoding belongs to an external image codec.

use veles_common::{ByteCursor, Endian};

use crate::{Error, Result};

const FORMAT_BIT_LOSSLESS: u32 = 1 << 20;
const FORMAT_BIT_LOSSY: u32 = 1 << 21;
const FORMAT_BIT_STREAM: u32 = 1 << 22;
const FORMAT_BIT_HAS_MIPMAPS: u32 = 1 << 23;

/// A Godot 3 `.stex` stream texture header (`GDST`).
#[derive(Debug, Clone)]
pub struct StreamTexture {
    pub width: i16,
    pub custom_width: i16,
    pub height: i16,
    pub custom_height: i16,
    pub flags: u32,
    pub data_format: u32,
    /// Present only for lossless/lossy encodings.
    pub mipmaps: Option<i32>,
    /// Pixel payload, undecoded.
    pub data: Vec<u8>,
}

impl StreamTexture {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Little);
        let magic = cursor.read_chars(4)?;
        if magic != "GDST" {
            return Err(Error::BadMagic {
                expected: "GDST".into(),
                actual: magic,
            });
        }

        let width = cursor.read_i16()?;
        let custom_width = cursor.read_i16()?;
        let height = cursor.read_i16()?;
        let custom_height = cursor.read_i16()?;
        let flags = cursor.read_u32()?;
        let data_format = cursor.read_u32()?;

        let mut mipmaps = None;
        if data_format & (FORMAT_BIT_LOSSLESS | FORMAT_BIT_LOSSY) != 0 {
            mipmaps = Some(cursor.read_i32()?);
            let _size = cursor.read_i32()?;
        }

        Ok(Self {
            width,
            custom_width,
            height,
            custom_height,
            flags,
            data_format,
            mipmaps,
            data: cursor.read(cursor.remaining())?.to_vec(),
        })
    }

    pub fn has_mipmaps(&self) -> bool {
        self.data_format & FORMAT_BIT_HAS_MIPMAPS != 0
    }

    pub fn is_streamed(&self) -> bool {
        self.data_format & FORMAT_BIT_STREAM != 0
    }
}

/// A Godot 4 `.ctex` compressed texture header (`GST2`).
#[derive(Debug, Clone)]
pub struct CompressedTexture {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub data_format: u32,
    /// Everything past the header, undecoded.
    pub data: Vec<u8>,
}

impl CompressedTexture {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Little);
        let magic = cursor.read_chars(4)?;
        if magic != "GST2" {
            return Err(Error::BadMagic {
                expected: "GST2".into(),
                actual: magic,
            });
        }

        let version = cursor.read_u32()?;
        let width = cursor.read_u32()?;
        let height = cursor.read_u32()?;
        let data_format = cursor.read_u32()?;

        Ok(Self {
            version,
            width,
            height,
            data_format,
            data: cursor.read(cursor.remaining())?.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veles_common::ByteWriter;

    #[test]
    fn test_stream_texture() {
        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"GDST");
        w.write_i16(256);
        w.write_i16(256);
        w.write_i16(128);
        w.write_i16(128);
        w.write_u32(7);
        w.write_u32(FORMAT_BIT_LOSSLESS | FORMAT_BIT_HAS_MIPMAPS);
        w.write_i32(3); // mipmaps
        w.write_i32(4); // size
        w.write(&[9, 9, 9, 9]);

        let tex = StreamTexture::parse(w.data()).unwrap();
        assert_eq!(tex.width, 256);
        assert_eq!(tex.height, 128);
        assert_eq!(tex.mipmaps, Some(3));
        assert!(tex.has_mipmaps());
        assert!(!tex.is_streamed());
        assert_eq!(tex.data, vec![9, 9, 9, 9]);
    }

    #[test]
    fn test_stream_texture_raw_format_skips_mipmap_header() {
        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"GDST");
        w.write_i16(4);
        w.write_i16(4);
        w.write_i16(4);
        w.write_i16(4);
        w.write_u32(0);
        w.write_u32(0); // raw format, no lossless/lossy bits
        w.write(&[1, 2]);

        let tex = StreamTexture::parse(w.data()).unwrap();
        assert_eq!(tex.mipmaps, None);
        assert_eq!(tex.data, vec![1, 2]);
    }

    #[test]
    fn test_compressed_texture() {
        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"GST2");
        w.write_u32(1);
        w.write_u32(64);
        w.write_u32(32);
        w.write_u32(0);
        w.write(&[5, 5]);

        let tex = CompressedTexture::parse(w.data()).unwrap();
        assert_eq!((tex.width, tex.height), (64, 32));
        assert_eq!(tex.data, vec![5, 5]);
    }

    #[test]
    fn test_bad_magic() {
        assert!(StreamTexture::parse(b"XXXX\x00\x00").is_err());
        assert!(CompressedTexture::parse(b"YYYY\x00\x00").is_err());
    }
}
