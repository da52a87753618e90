//!
//! A conformant stand-in for the MKPack delta compressor used inside `.pak` scan
//! files. The bit-level compression scheme itself is explicitly out of scope (spec
//! §1), but its data contract is not: "first sample raw, successors differences"
//! (spec §6). This module honours that contract with a documented fixed-width
//! delta/zigzag scheme so the rest of the pipeline has something concrete to decode
//! against and round-trip test fixtures can be built without real instrument files.
//!
//! Layout: a little-endian `i32` holding the first raw sample, followed by one or
//! more blocks. Each block starts with a one-byte bit-width `w` (0..=32) and then
//! `ceil(8 * w / 8)` bytes holding up to 8 zigzag-encoded deltas packed at `w` bits
//! each, MSB-first within each byte.

use crate::result::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

const BLOCK_LEN: usize = 8;

fn zigzag_encode(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn zigzag_decode(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

fn bits_needed(v: u32) -> u8 {
    32 - v.leading_zeros().min(32) as u8
}

/// Decompresses `compressed` into `pixel_count` delta-decoded samples.
pub fn decompress(compressed: &[u8], pixel_count: usize) -> Result<Vec<i32>> {
    if pixel_count == 0 {
        return Ok(Vec::new());
    }
    let mut cursor = Cursor::new(compressed);
    let first = cursor
        .read_i32::<LittleEndian>()
        .map_err(|_| Error::UnexpectedEof)?;

    let mut samples = Vec::with_capacity(pixel_count);
    samples.push(first);
    let mut previous = first;

    while samples.len() < pixel_count {
        let width = cursor.read_u8().map_err(|_| Error::UnexpectedEof)?;
        let remaining = pixel_count - samples.len();
        let count = remaining.min(BLOCK_LEN);
        let packed_bytes = (width as usize * BLOCK_LEN).div_ceil(8);
        let mut bits_buf = vec![0u8; packed_bytes];
        cursor.read_exact(&mut bits_buf).map_err(|_| Error::UnexpectedEof)?;

        let mut reader = BitReader::new(&bits_buf);
        for _ in 0..count {
            let raw = reader.read_bits(width);
            let delta = zigzag_decode(raw);
            previous = previous.wrapping_add(delta);
            samples.push(previous);
        }
    }

    Ok(samples)
}

/// Compresses `samples` into the same format [decompress] reads. Used by test
/// fixtures and by any future archival/write path.
pub fn compress(samples: &[i32]) -> Vec<u8> {
    let mut out = Vec::new();
    if samples.is_empty() {
        return out;
    }
    out.write_i32::<LittleEndian>(samples[0]).unwrap();

    let mut previous = samples[0];
    let mut idx = 1;
    while idx < samples.len() {
        let count = (samples.len() - idx).min(BLOCK_LEN);
        let deltas: Vec<u32> = samples[idx..idx + count]
            .iter()
            .map(|&s| {
                let d = zigzag_encode(s.wrapping_sub(previous));
                previous = s;
                d
            })
            .collect();
        let width = deltas.iter().map(|&d| bits_needed(d)).max().unwrap_or(0);
        out.write_u8(width).unwrap();

        let mut writer = BitWriter::new();
        for &d in &deltas {
            writer.write_bits(d, width);
        }
        for _ in deltas.len()..BLOCK_LEN {
            writer.write_bits(0, width);
        }
        out.extend_from_slice(&writer.into_bytes());

        idx += count;
    }
    out
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read_bits(&mut self, width: u8) -> u32 {
        let mut value = 0u32;
        for _ in 0..width {
            let byte_idx = self.bit_pos / 8;
            let bit_idx = 7 - (self.bit_pos % 8);
            let bit = if byte_idx < self.data.len() {
                (self.data[byte_idx] >> bit_idx) & 1
            } else {
                0
            };
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        value
    }
}

struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_pos: 0,
        }
    }

    fn write_bits(&mut self, value: u32, width: u8) {
        for i in (0..width).rev() {
            let bit = (value >> i) & 1;
            let byte_idx = self.bit_pos / 8;
            if byte_idx >= self.bytes.len() {
                self.bytes.push(0);
            }
            if bit == 1 {
                let bit_idx = 7 - (self.bit_pos % 8);
                self.bytes[byte_idx] |= 1 << bit_idx;
            }
            self.bit_pos += 1;
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_round_trips() {
        let samples: Vec<i32> = (0..200).map(|i| (i * i) % 4000 - 2000).collect();
        let compressed = compress(&samples);
        let decompressed = decompress(&compressed, samples.len()).unwrap();
        assert_eq!(decompressed, samples);
    }

    #[test]
    fn single_sample_round_trips() {
        let samples = vec![42];
        let compressed = compress(&samples);
        let decompressed = decompress(&compressed, 1).unwrap();
        assert_eq!(decompressed, samples);
    }

    #[test]
    fn empty_input_decompresses_to_empty() {
        assert_eq!(decompress(&[], 0).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn negative_deltas_round_trip() {
        let samples = vec![1000, 500, 250, 0, -500, -1000];
        let compressed = compress(&samples);
        let decompressed = decompress(&compressed, samples.len()).unwrap();
        assert_eq!(decompressed, samples);
    }
}
