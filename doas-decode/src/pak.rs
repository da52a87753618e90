//!
//! MKZY record framing: the fixed header every spectrum record in a `.pak` file
//! carries, and the delta-encoded sample payload that follows it (spec §6).
//!
//! The bit-level detail of the MKPack compression scheme itself is out of scope (spec
//! §1 "deliberately out of scope ... the .pak binary codec itself, treated as a
//! byte-level black box; its data contract is specified"); [crate::mkpack] provides a
//! conformant stand-in that honours that data contract (first sample raw, successors
//! delta-coded) without claiming bit-exact compatibility with the original encoder.

use crate::mkpack;
use crate::result::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use doas_model::data::Timestamp;
use std::io::Read;

pub const RECORD_TAG: [u8; 4] = *b"MKZY";

/// The fixed-layout header preceding every spectrum record (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub header_size: u16,
    pub version: u8,
    pub instrument_serial: String,
    pub spectrum_name: String,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub channel: u8,
    pub start_channel: u16,
    pub coadds: u16,
    pub pixels: u16,
    pub compressed_size: u16,
    pub scan_angle: f32,
    pub scan_angle_2: f32,
    pub cone_angle: f32,
    pub tilt: f32,
    pub compass_deg: f64,
    pub exposure_time_ms: u16,
    pub gps_latitude: f32,
    pub gps_longitude: f32,
    pub gps_altitude: f32,
    pub checksum: u16,
    pub temperature: f32,
    pub battery_voltage: f64,
    pub scan_index: u16,
    pub scan_count: u16,
    pub flags: u16,
}

impl RecordHeader {
    pub fn is_composite_channel(&self) -> bool {
        self.channel >= 128
    }
}

/// Packs `hh:mm:ss.ms` into the `hhmmssms` 32-bit representation used on disk.
pub fn pack_time(hour: u32, minute: u32, second: u32, milli: u32) -> u32 {
    hour * 10_000_000 + minute * 100_000 + second * 1_000 + milli
}

/// Unpacks the `hhmmssms` 32-bit on-disk representation.
pub fn unpack_time(packed: u32) -> Result<(u32, u32, u32, u32)> {
    let milli = packed % 1_000;
    let rest = packed / 1_000;
    let second = rest % 100;
    let rest = rest / 100;
    let minute = rest % 100;
    let hour = rest / 100;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(Error::InvalidPackedTime(packed));
    }
    Ok((hour, minute, second, milli))
}

/// Unpacks a `ddmmyy` on-disk date value into `(year, month, day)`, assuming the
/// 2000s century (the instruments this format targets were never deployed before
/// 2000).
pub fn unpack_date(packed: u32) -> (i32, u32, u32) {
    let year = (packed % 100) as i32 + 2000;
    let rest = packed / 100;
    let month = rest % 100;
    let day = rest / 100;
    (year, month, day)
}

pub fn pack_date(year: i32, month: u32, day: u32) -> u32 {
    let yy = (year % 100) as u32;
    day * 10_000 + month * 100 + yy
}

/// Reads one MKZY record's header from `reader`. Does not read the compressed
/// payload; call [read_record_payload] next.
pub fn read_record_header<R: Read>(reader: &mut R) -> Result<RecordHeader> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    if tag != RECORD_TAG {
        return Err(Error::MissingTag { offset: 0 });
    }

    let header_size = reader.read_u16::<LittleEndian>()?;
    let version = reader.read_u8()?;

    let mut serial_buf = [0u8; 16];
    reader.read_exact(&mut serial_buf)?;
    let instrument_serial = ascii_trim(&serial_buf);

    let mut name_buf = [0u8; 12];
    reader.read_exact(&mut name_buf)?;
    let spectrum_name = ascii_trim(&name_buf);

    let date_packed = reader.read_u32::<LittleEndian>()?;
    let (year, month, day) = unpack_date(date_packed);

    let start_packed = reader.read_u32::<LittleEndian>()?;
    let (h0, m0, s0, ms0) = unpack_time(start_packed)?;
    let start_time = Timestamp::from_ymd_hms_milli(year, month, day, h0, m0, s0, ms0)
        .ok_or(Error::InvalidPackedTime(start_packed))?;

    let stop_packed = reader.read_u32::<LittleEndian>()?;
    let (h1, m1, s1, ms1) = unpack_time(stop_packed)?;
    let stop_time = Timestamp::from_ymd_hms_milli(year, month, day, h1, m1, s1, ms1)
        .ok_or(Error::InvalidPackedTime(stop_packed))?;

    let channel = reader.read_u8()?;
    let start_channel = reader.read_u16::<LittleEndian>()?;
    let coadds = reader.read_u16::<LittleEndian>()?;
    let pixels = reader.read_u16::<LittleEndian>()?;
    let compressed_size = reader.read_u16::<LittleEndian>()?;
    let scan_angle = reader.read_f32::<LittleEndian>()?;
    let scan_angle_2 = reader.read_f32::<LittleEndian>()?;
    let cone_angle = reader.read_f32::<LittleEndian>()?;
    let tilt = reader.read_f32::<LittleEndian>()?;
    let compass_tenths = reader.read_i16::<LittleEndian>()?;
    let exposure_time_ms = reader.read_u16::<LittleEndian>()?;
    let gps_latitude = reader.read_f32::<LittleEndian>()?;
    let gps_longitude = reader.read_f32::<LittleEndian>()?;
    let gps_altitude = reader.read_f32::<LittleEndian>()?;
    let checksum = reader.read_u16::<LittleEndian>()?;
    let temperature = reader.read_f32::<LittleEndian>()?;
    let battery_adc = reader.read_u16::<LittleEndian>()?;
    let scan_index = reader.read_u16::<LittleEndian>()?;
    let scan_count = reader.read_u16::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;

    Ok(RecordHeader {
        header_size,
        version,
        instrument_serial,
        spectrum_name,
        start_time,
        stop_time,
        channel,
        start_channel,
        coadds,
        pixels,
        compressed_size,
        scan_angle,
        scan_angle_2,
        cone_angle,
        tilt,
        compass_deg: compass_tenths as f64 / 10.0,
        exposure_time_ms,
        gps_latitude,
        gps_longitude,
        gps_altitude,
        checksum,
        temperature,
        battery_voltage: battery_adc as f64 / 100.0,
        scan_index,
        scan_count,
        flags,
    })
}

/// Reads, decompresses, and checksum-verifies the sample payload following a header
/// read with [read_record_header]. A checksum mismatch is returned as an error, not
/// panicked on, so the caller (the scan reader, C2) can treat it as a recoverable
/// per-spectrum event (spec §4.2, §7 `SpectrumCorrupt`).
pub fn read_record_payload<R: Read>(reader: &mut R, header: &RecordHeader) -> Result<Vec<i32>> {
    let mut compressed = vec![0u8; header.compressed_size as usize];
    reader.read_exact(&mut compressed)?;

    let samples = mkpack::decompress(&compressed, header.pixels as usize)?;
    if samples.len() != header.pixels as usize {
        return Err(Error::PixelCountMismatch {
            expected: header.pixels as usize,
            actual: samples.len(),
        });
    }

    let actual = checksum(&samples);
    if actual != header.checksum {
        return Err(Error::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }

    Ok(samples)
}

/// Computes the 16-bit truncated checksum: samples are summed into a 32-bit
/// accumulator, which is then folded into 16 bits by adding its low and high halves
/// (spec §6; grounded on `original_source/PPPLib/src/Spectra/SpectrumIO.cpp`'s
/// `checksum = p[0] + p[1]` over the accumulated 32-bit sum).
pub fn checksum(samples: &[i32]) -> u16 {
    let sum: i64 = samples.iter().map(|&s| s as i64).sum();
    let acc = sum as u32;
    let low = (acc & 0xFFFF) as u16;
    let high = (acc >> 16) as u16;
    low.wrapping_add(high)
}

fn ascii_trim(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pack_unpack_time_round_trip() {
        let packed = pack_time(14, 7, 59, 123);
        let (h, m, s, ms) = unpack_time(packed).unwrap();
        assert_eq!((h, m, s, ms), (14, 7, 59, 123));
    }

    #[test]
    fn pack_unpack_date_round_trip() {
        let packed = pack_date(2023, 1, 20);
        let (y, m, d) = unpack_date(packed);
        assert_eq!((y, m, d), (2023, 1, 20));
    }

    #[test]
    fn invalid_packed_time_rejected() {
        assert!(unpack_time(pack_time(25, 0, 0, 0)).is_err());
    }

    #[test]
    fn checksum_matches_fold_of_accumulator() {
        let samples = vec![1000, 2000, 70000];
        let c = checksum(&samples);
        let acc: u32 = 73000;
        let expected = ((acc & 0xFFFF) as u16).wrapping_add((acc >> 16) as u16);
        assert_eq!(c, expected);
    }

    #[test]
    fn header_round_trip_via_writer() {
        let mut buf = Vec::new();
        crate::test_support::write_test_record_header(&mut buf, "2002128M1", "scan", 2023, 1, 20, 0);
        let mut cursor = Cursor::new(buf);
        let header = read_record_header(&mut cursor).unwrap();
        assert_eq!(header.instrument_serial, "2002128M1");
        assert_eq!(header.spectrum_name, "scan");
    }
}
