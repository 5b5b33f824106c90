//! FSB5 sound bank parsing.
//!
//! An FSB5 bank is a fixed header, one bit-packed 64-bit metadata word per
//! sample (with an optional chain of chunk records hanging off it), an
//! optional name table, and a shared data region. The sample-rate field of
//! the metadata word starts at bit 34, so extraction has to stay in 64-bit
//! arithmetic the whole way — a 32-bit shift silently loses it.

mod error;

use serde::Serialize;
use tracing::debug;
use veles_common::{ByteCursor, Endian};

pub use error::{Error, Result};

/// Size of the fixed header: magic + six u32 fields + 32 reserved/hash bytes.
const HEADER_SIZE: usize = 60;

/// Codec of the samples in a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SoundFormat {
    Unknown,
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    PcmFloat,
    GcAdpcm,
    ImaAdpcm,
    Vag,
    HeVag,
    Xma,
    Mpeg,
    Celt,
    Atrac9,
    Xwma,
    Vorbis,
    FAdpcm,
    Opus,
}

impl From<u32> for SoundFormat {
    fn from(value: u32) -> Self {
        match value {
            1 => SoundFormat::Pcm8,
            2 => SoundFormat::Pcm16,
            3 => SoundFormat::Pcm24,
            4 => SoundFormat::Pcm32,
            5 => SoundFormat::PcmFloat,
            6 => SoundFormat::GcAdpcm,
            7 => SoundFormat::ImaAdpcm,
            8 => SoundFormat::Vag,
            9 => SoundFormat::HeVag,
            10 => SoundFormat::Xma,
            11 => SoundFormat::Mpeg,
            12 => SoundFormat::Celt,
            13 => SoundFormat::Atrac9,
            14 => SoundFormat::Xwma,
            15 => SoundFormat::Vorbis,
            16 => SoundFormat::FAdpcm,
            17 => SoundFormat::Opus,
            _ => SoundFormat::Unknown,
        }
    }
}

/// Kind of a per-sample metadata chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkType {
    Unknown,
    Channels,
    SampleRate,
    Loop,
    Comment,
    XmaSeekTable,
    DspCoefficients,
    Atrac9Config,
    XwmaConfig,
    VorbisSeekTable,
    PeakVolume,
    VorbisIntraLayers,
    OpusDataSize,
}

impl From<u32> for ChunkType {
    fn from(value: u32) -> Self {
        match value {
            1 => ChunkType::Channels,
            2 => ChunkType::SampleRate,
            3 => ChunkType::Loop,
            4 => ChunkType::Comment,
            6 => ChunkType::XmaSeekTable,
            7 => ChunkType::DspCoefficients,
            9 => ChunkType::Atrac9Config,
            10 => ChunkType::XwmaConfig,
            11 => ChunkType::VorbisSeekTable,
            13 => ChunkType::PeakVolume,
            14 => ChunkType::VorbisIntraLayers,
            15 => ChunkType::OpusDataSize,
            _ => ChunkType::Unknown,
        }
    }
}

/// One chunk from a sample's metadata chain.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    pub kind: ChunkType,
    pub data: Vec<u8>,
}

/// One decoded sample descriptor.
#[derive(Debug, Clone)]
pub struct Fsb5Sample {
    /// Name from the name table, when the bank has one.
    pub name: Option<String>,
    /// Base frequency from the packed frequency index.
    pub frequency: u32,
    pub channels: u16,
    /// Offset into the shared data region.
    pub data_offset: u64,
    /// Sample rate from bits 34 and up of the metadata word.
    pub sample_rate: u32,
    pub chunks: Vec<SampleChunk>,
    /// This sample's slice of the data region.
    pub data: Vec<u8>,
}

/// A parsed FSB5 sound bank.
#[derive(Debug)]
pub struct Fsb5File {
    pub version: u32,
    pub format: SoundFormat,
    pub data_size: u32,
    pub samples: Vec<Fsb5Sample>,
}

fn frequency_from_index(index: u32) -> Result<u32> {
    Ok(match index {
        0 => 4000,
        1 => 8000,
        2 => 11000,
        3 => 11025,
        4 => 16000,
        5 => 22050,
        6 => 24000,
        7 => 32000,
        8 => 44100,
        9 => 48000,
        10 => 96000,
        other => return Err(Error::UnknownFrequency(other)),
    })
}

impl Fsb5File {
    /// Parse a sound bank.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Little);

        let magic = cursor.read_chars(4)?;
        if magic != "FSB5" {
            return Err(Error::BadMagic(magic));
        }
        let version = cursor.read_u32()?;
        if version != 1 {
            return Err(Error::UnsupportedVersion(version));
        }
        let num_samples = cursor.read_u32()? as usize;
        let sample_headers_size = cursor.read_u32()? as usize;
        let name_table_size = cursor.read_u32()? as usize;
        let data_size = cursor.read_u32()?;
        let format = SoundFormat::from(cursor.read_u32()?);
        cursor.read(16)?; // reserved
        cursor.read(16)?; // hash

        debug!(
            version,
            num_samples,
            sample_headers_size,
            name_table_size,
            data_size,
            ?format,
            "parsed FSB5 header"
        );

        let name_table_start = HEADER_SIZE + sample_headers_size;
        let data_start = name_table_start + name_table_size;
        if data_start + data_size as usize > data.len() {
            return Err(Error::StructuralInvariant(format!(
                "declared regions end at {} but the buffer is {} bytes",
                data_start + data_size as usize,
                data.len()
            )));
        }
        let data_region = &data[data_start..data_start + data_size as usize];

        // Sample metadata lives in its own region; an isolated cursor keeps a
        // corrupt chunk chain from running into the name table.
        let mut headers = cursor.sub_cursor(HEADER_SIZE, sample_headers_size)?;

        let mut samples = Vec::with_capacity(num_samples.min(data.len()));
        for _ in 0..num_samples {
            let meta = headers.read_u64()?;
            let mut next_chunk = meta & 1 == 1;
            let frequency = frequency_from_index(((meta & 0x1F) >> 1) as u32)?;
            let stereo = (meta & 0x3F) >> 5 != 0;
            let data_offset = (meta & 0x3_FFFF_FFFF) >> 6;
            let sample_rate = (meta >> 34) as u32;

            let mut chunks = Vec::new();
            while next_chunk {
                let word = headers.read_u32()?;
                next_chunk = word & 1 == 1;
                let chunk_size = ((word & 0x01FF_FFFF) >> 1) as usize;
                let kind = ChunkType::from(word >> 25);
                chunks.push(SampleChunk {
                    kind,
                    data: headers.read(chunk_size)?.to_vec(),
                });
            }

            if data_offset > data_size as u64 {
                return Err(Error::StructuralInvariant(format!(
                    "sample data offset {data_offset} exceeds data size {data_size}"
                )));
            }
            // Every sample sees from its own offset to the end of the shared
            // region; per-sample lengths are not declared in the header.
            let sample_data = data_region[data_offset as usize..].to_vec();

            samples.push(Fsb5Sample {
                name: None,
                frequency,
                channels: if stereo { 2 } else { 1 },
                data_offset,
                sample_rate,
                chunks,
                data: sample_data,
            });
        }

        if name_table_size > 0 {
            let names = cursor.sub_cursor(name_table_start, name_table_size)?;
            let mut offsets = names.clone();
            for sample in samples.iter_mut() {
                let offset = offsets.read_u32()? as usize;
                let mut name_cursor = names.clone();
                name_cursor.seek(offset as i64, veles_common::Whence::Set)?;
                sample.name = Some(name_cursor.read_cstring()?);
            }
        }

        Ok(Self {
            version,
            format,
            data_size,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veles_common::ByteWriter;

    fn meta_word(
        has_chunks: bool,
        freq_index: u64,
        stereo: bool,
        data_offset: u64,
        sample_rate: u64,
    ) -> u64 {
        (has_chunks as u64)
            | (freq_index << 1)
            | ((stereo as u64) << 5)
            | (data_offset << 6)
            | (sample_rate << 34)
    }

    /// Build a two-sample bank with a name table and a 32-byte data region.
    fn build_bank() -> Vec<u8> {
        let mut headers = ByteWriter::new(Endian::Little);
        // Sample 1: one sample-rate chunk, stereo, 44100 table frequency.
        headers.write_u64(meta_word(true, 8, true, 0, 48000));
        headers.write_u32((4 << 1) | (2 << 25)); // final chunk: 4 bytes, SampleRate
        headers.write(&0x0000BB80u32.to_le_bytes());
        // Sample 2: no chunks, mono, 48000, offset 16, rate above the 32-bit
        // boundary of the packed word.
        headers.write_u64(meta_word(false, 9, false, 16, 22050));
        let headers = headers.into_bytes();

        let mut names = ByteWriter::new(Endian::Little);
        names.write_u32(8); // "kick"
        names.write_u32(13); // "snare"
        names.write_cstring("kick");
        names.write_cstring("snare");
        let names = names.into_bytes();

        let data_region: Vec<u8> = (0..32).collect();

        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"FSB5");
        w.write_u32(1);
        w.write_u32(2);
        w.write_u32(headers.len() as u32);
        w.write_u32(names.len() as u32);
        w.write_u32(data_region.len() as u32);
        w.write_u32(2); // PCM16
        w.write(&[0u8; 32]);
        w.write(&headers);
        w.write(&names);
        w.write(&data_region);
        w.into_bytes()
    }

    #[test]
    fn test_two_sample_bank() {
        let bank = Fsb5File::parse(&build_bank()).unwrap();
        assert_eq!(bank.format, SoundFormat::Pcm16);
        assert_eq!(bank.samples.len(), 2);

        let first = &bank.samples[0];
        assert_eq!(first.name.as_deref(), Some("kick"));
        assert_eq!(first.frequency, 44100);
        assert_eq!(first.channels, 2);
        assert_eq!(first.data_offset, 0);
        assert_eq!(first.sample_rate, 48000);
        assert_eq!(first.chunks.len(), 1);
        assert_eq!(first.chunks[0].kind, ChunkType::SampleRate);
        assert_eq!(first.chunks[0].data, 0x0000BB80u32.to_le_bytes());
        assert_eq!(first.data.len(), 32);

        let second = &bank.samples[1];
        assert_eq!(second.name.as_deref(), Some("snare"));
        assert_eq!(second.frequency, 48000);
        assert_eq!(second.channels, 1);
        assert_eq!(second.data_offset, 16);
        assert_eq!(second.sample_rate, 22050);
        assert!(second.chunks.is_empty());
        assert_eq!(second.data, (16..32).collect::<Vec<u8>>());
    }

    #[test]
    fn test_sample_rate_survives_high_bits() {
        // A rate needing well above 32 bits of the packed word.
        let mut headers = ByteWriter::new(Endian::Little);
        headers.write_u64(meta_word(false, 9, false, 0, 192_000));
        let headers = headers.into_bytes();

        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"FSB5");
        w.write_u32(1);
        w.write_u32(1);
        w.write_u32(headers.len() as u32);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(2);
        w.write(&[0u8; 32]);
        w.write(&headers);

        let bank = Fsb5File::parse(&w.into_bytes()).unwrap();
        assert_eq!(bank.samples[0].sample_rate, 192_000);
    }

    #[test]
    fn test_bad_magic_and_version() {
        assert!(matches!(
            Fsb5File::parse(b"FSB4aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            Err(Error::BadMagic(_))
        ));

        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"FSB5");
        w.write_u32(9);
        w.write(&[0u8; 52]);
        assert!(matches!(
            Fsb5File::parse(w.data()),
            Err(Error::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_unknown_frequency_index() {
        let mut headers = ByteWriter::new(Endian::Little);
        headers.write_u64(meta_word(false, 15, false, 0, 44100));
        let headers = headers.into_bytes();

        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"FSB5");
        w.write_u32(1);
        w.write_u32(1);
        w.write_u32(headers.len() as u32);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(2);
        w.write(&[0u8; 32]);
        w.write(&headers);

        assert!(matches!(
            Fsb5File::parse(w.data()),
            Err(Error::UnknownFrequency(15))
        ));
    }

    #[test]
    fn test_declared_regions_must_fit() {
        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"FSB5");
        w.write_u32(1);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u32(4096); // data size with no data present
        w.write_u32(2);
        w.write(&[0u8; 32]);
        assert!(matches!(
            Fsb5File::parse(w.data()),
            Err(Error::StructuralInvariant(_))
        ));
    }
}
