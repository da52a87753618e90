//!
//! Test-only fixture helpers shared across this crate's unit tests.
//!

use crate::pak::{pack_date, pack_time, RECORD_TAG};
use byteorder::{LittleEndian, WriteBytesExt};

/// Writes a record header matching [crate::pak::read_record_header]'s field order,
/// with placeholder pixel/compressed-size/checksum fields that callers patch in
/// afterward once the payload has been compressed.
pub(crate) fn write_test_record_header(
    buf: &mut Vec<u8>,
    serial: &str,
    name: &str,
    year: i32,
    month: u32,
    day: u32,
    scan_index: u16,
) {
    buf.extend_from_slice(&RECORD_TAG);
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u8(1).unwrap();
    let mut serial_buf = [0u8; 16];
    serial_buf[..serial.len()].copy_from_slice(serial.as_bytes());
    buf.extend_from_slice(&serial_buf);
    let mut name_buf = [0u8; 12];
    name_buf[..name.len()].copy_from_slice(name.as_bytes());
    buf.extend_from_slice(&name_buf);
    buf.write_u32::<LittleEndian>(pack_date(year, month, day)).unwrap();
    buf.write_u32::<LittleEndian>(pack_time(10, 0, 0, 0)).unwrap();
    buf.write_u32::<LittleEndian>(pack_time(10, 0, 1, 0)).unwrap();
    buf.write_u8(0).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u16::<LittleEndian>(10).unwrap();
    buf.write_u16::<LittleEndian>(100).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_f32::<LittleEndian>(0.0).unwrap();
    buf.write_f32::<LittleEndian>(0.0).unwrap();
    buf.write_f32::<LittleEndian>(90.0).unwrap();
    buf.write_f32::<LittleEndian>(0.0).unwrap();
    buf.write_i16::<LittleEndian>(0).unwrap();
    buf.write_u16::<LittleEndian>(100).unwrap();
    buf.write_f32::<LittleEndian>(19.4).unwrap();
    buf.write_f32::<LittleEndian>(-155.6).unwrap();
    buf.write_f32::<LittleEndian>(1200.0).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_f32::<LittleEndian>(20.0).unwrap();
    buf.write_u16::<LittleEndian>(1200).unwrap();
    buf.write_u16::<LittleEndian>(scan_index).unwrap();
    buf.write_u16::<LittleEndian>(50).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
}

/// Byte offset of the `pixels` field within a header written by
/// [write_test_record_header], for patching pixel count/compressed size/checksum
/// after the payload is known.
pub(crate) const PIXELS_OFFSET: usize = 4 + 2 + 1 + 16 + 12 + 4 + 4 + 4 + 1 + 2 + 2;
pub(crate) const CHECKSUM_OFFSET: usize = PIXELS_OFFSET + 4 + 4 * 4 + 2 + 2 + 4 * 3;
