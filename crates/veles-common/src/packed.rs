//! Bit-packed vector decoding.
//!
//! Unity stores compressed mesh and animation channels as bit streams of
//! arbitrary-width integers. The three wrappers here share one unpacking
//! scheme: values are written LSB-first, packed back to back across byte
//! boundaries, with a bit width declared once for the whole vector.

use crate::{ByteCursor, Error, Quaternion, Result};

/// Shared bit-stream state for the unpack loops.
struct BitReader<'a> {
    data: &'a [u8],
    index: usize,
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: 0,
            bit_pos: 0,
        }
    }

    /// Position the stream at `item * bit_size` bits.
    fn seek_items(&mut self, item: usize, bit_size: u8) {
        let bit = item * bit_size as usize;
        self.index = bit / 8;
        self.bit_pos = (bit % 8) as u32;
    }

    /// Pull `bit_size` bits, LSB first, crossing byte boundaries as needed.
    fn take(&mut self, bit_size: u32) -> u32 {
        let mut x: u32 = 0;
        let mut bits: u32 = 0;
        while bits < bit_size {
            let byte = self.data.get(self.index).copied().unwrap_or(0) as u32;
            x |= (byte >> self.bit_pos) << bits;
            let num = (bit_size - bits).min(8 - self.bit_pos);
            self.bit_pos += num;
            bits += num;
            if self.bit_pos >= 8 {
                self.index += 1;
                self.bit_pos = 0;
            }
        }
        x & mask(bit_size)
    }
}

#[inline]
fn mask(bit_size: u32) -> u32 {
    if bit_size >= 32 {
        u32::MAX
    } else {
        (1u32 << bit_size) - 1
    }
}

/// Check that `count` items of `bit_size` bits fit inside `len` bytes.
fn check_capacity(count: usize, bit_size: u8, len: usize) -> Result<()> {
    let needed_bits = count as u64 * bit_size as u64;
    if needed_bits > len as u64 * 8 {
        return Err(Error::PackedOverflow {
            count,
            bit_size,
            len,
        });
    }
    Ok(())
}

/// A bit-packed vector of unsigned integers.
#[derive(Debug, Clone)]
pub struct PackedIntVector {
    pub length: u32,
    pub bit_size: u8,
    data: Vec<u8>,
}

impl PackedIntVector {
    /// Parse the serialized form: count, byte blob (u32 length, 4-aligned),
    /// bit size (4-aligned).
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let length = cursor.read_u32()?;
        let data_len = cursor.read_u32()? as usize;
        let data = cursor.read(data_len)?.to_vec();
        cursor.align(4)?;
        let bit_size = cursor.read_u8()?;
        cursor.align(4)?;
        Ok(Self {
            length,
            bit_size,
            data,
        })
    }

    /// Unpack all values.
    pub fn unpack(&self) -> Result<Vec<u32>> {
        check_capacity(self.length as usize, self.bit_size, self.data.len())?;
        let mut bits = BitReader::new(&self.data);
        let mut out = Vec::with_capacity(self.length as usize);
        for _ in 0..self.length {
            out.push(bits.take(self.bit_size as u32));
        }
        Ok(out)
    }
}

/// A bit-packed vector of quantized floats.
#[derive(Debug, Clone)]
pub struct PackedFloatVector {
    pub length: u32,
    pub range: f32,
    pub start: f32,
    pub bit_size: u8,
    data: Vec<u8>,
}

impl PackedFloatVector {
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let length = cursor.read_u32()?;
        let range = cursor.read_f32()?;
        let start = cursor.read_f32()?;
        let data_len = cursor.read_u32()? as usize;
        let data = cursor.read(data_len)?.to_vec();
        cursor.align(4)?;
        let bit_size = cursor.read_u8()?;
        cursor.align(4)?;
        Ok(Self {
            length,
            range,
            start,
            bit_size,
            data,
        })
    }

    /// Unpack `num_chunks` chunks of `chunk_item_count` values each, starting
    /// at item `start`. `num_chunks = None` unpacks `length / chunk_item_count`
    /// chunks. `chunk_stride` is in bytes of the destination layout.
    pub fn unpack(
        &self,
        chunk_item_count: usize,
        chunk_stride: usize,
        start: usize,
        num_chunks: Option<usize>,
    ) -> Result<Vec<f32>> {
        if chunk_item_count == 0 || chunk_stride == 0 {
            return Ok(Vec::new());
        }
        let num_chunks =
            num_chunks.unwrap_or_else(|| self.length as usize / chunk_item_count);
        let total = num_chunks * chunk_item_count;
        check_capacity(start + total, self.bit_size, self.data.len())?;

        let scale = 1.0 / self.range;
        let denom = mask(self.bit_size as u32) as f32;
        let mut bits = BitReader::new(&self.data);
        bits.seek_items(start, self.bit_size);

        let mut out = Vec::with_capacity(total);
        let end = chunk_stride * num_chunks / 4;
        let step = chunk_stride / 4;
        let mut index = 0;
        while index < end {
            for _ in 0..chunk_item_count {
                let x = bits.take(self.bit_size as u32);
                out.push(x as f32 / (scale * denom) + self.start);
            }
            index += step;
        }
        Ok(out)
    }
}

/// A bit-packed vector of unit quaternions.
///
/// Each quaternion stores 3 flag bits (omitted-component index plus its sign)
/// followed by the three remaining components at 10 bits each, except the
/// component immediately after the omitted one, which gets 9. The omitted
/// component is reconstructed from the unit-length constraint.
#[derive(Debug, Clone)]
pub struct PackedQuaternionVector {
    pub length: u32,
    data: Vec<u8>,
}

impl PackedQuaternionVector {
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let length = cursor.read_u32()?;
        let data_len = cursor.read_u32()? as usize;
        let data = cursor.read(data_len)?.to_vec();
        cursor.align(4)?;
        // The serialized form carries a bit size byte, but quaternion widths
        // are fixed by the flag bits.
        let _bit_size = cursor.read_u8()?;
        cursor.align(4)?;
        Ok(Self { length, data })
    }

    pub fn unpack(&self) -> Result<Vec<Quaternion>> {
        // Each quaternion spends exactly 3 flag bits + 9 + 10 + 10 = 32 bits.
        check_capacity(self.length as usize, 32, self.data.len())?;
        let mut bits = BitReader::new(&self.data);
        let mut out = Vec::with_capacity(self.length as usize);
        for _ in 0..self.length {
            let flags = bits.take(3);
            let omitted = (flags & 3) as usize;

            let mut quat = Quaternion::default();
            let mut sum = 0.0f32;
            for j in 0..4 {
                if j != omitted {
                    let bit_size = if j == (omitted + 1) % 4 { 9 } else { 10 };
                    let x = bits.take(bit_size);
                    let value = x as f32 / (0.5 * mask(bit_size) as f32) - 1.0;
                    quat.set_component(j, value);
                    sum += value * value;
                }
            }

            let last = (1.0 - sum).max(0.0).sqrt();
            quat.set_component(omitted, if flags & 4 != 0 { -last } else { last });
            out.push(quat);
        }
        Ok(out)
    }
}
