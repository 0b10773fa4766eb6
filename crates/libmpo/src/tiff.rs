
// https://www.itu.int/itudoc/itu-t/com16/tiff-fx/docs/tiff6.pdf

use std::io::Read;

use derive_more::Display;
use num_derive::FromPrimitive;

use crate::error::{Error, Result};

/// Size of a TIFF header: byte order, magic number and first IFD offset.
pub const TIFF_HEADER_SIZE: u32 = 8;

/// Size of one IFD entry: tag, type, count and value/offset slot.
pub const IFD_ENTRY_SIZE: u32 = 12;

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const TIFF_MAGIC: u16 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `0x4949` (little-endian)
    LittleEndian,
    /// `0x4D4D` (big-endian)
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub first_ifd_offset: u32,
}

/// Wire data types understood by the parser.
///
/// `Long` and `SLong` are the unsigned and signed 32-bit integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum DataType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    Undefined = 7,
    SLong = 9,
    SRational = 10,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[display("{numerator}/{denominator}")]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[display("{numerator}/{denominator}")]
pub struct SRational {
    pub numerator: i32,
    pub denominator: i32,
}

/// The kind of directory a tag lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IfdType {
    Ifd0,
    Ifd1,
    Exif,
    Gps,
    Interoperability,
    MpIndex,
    MpAttribute,
}

/// Header of one IFD entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub ifd: IfdType,
    pub id: u16,
    pub data_type: DataType,
    pub component_count: u32,
}

impl ByteOrder {
    pub fn read_u16<R: Read>(self, reader: &mut R) -> std::io::Result<u16> {
        let mut buffer = [0; 2];
        reader.read_exact(&mut buffer)?;
        Ok(self.u16_from_bytes(buffer))
    }

    pub fn read_u32<R: Read>(self, reader: &mut R) -> std::io::Result<u32> {
        let mut buffer = [0; 4];
        reader.read_exact(&mut buffer)?;
        Ok(self.u32_from_bytes(buffer))
    }

    pub fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        }
    }

    pub fn write_u16(self, buffer: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::LittleEndian => buffer.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => buffer.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(self, buffer: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::LittleEndian => buffer.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::BigEndian => buffer.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// The two marker bytes that open a TIFF header in this byte order.
    pub fn mark(self) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => *b"II",
            ByteOrder::BigEndian => *b"MM",
        }
    }
}

impl TiffHeader {
    /// * `reader` - Must be positioned at the first byte of the header.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        // Both marks are palindromic, so the raw order does not matter here.
        let byte_order = match ByteOrder::BigEndian.read_u16(reader)? {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            other => return Err(Error::InvalidByteOrder(other)),
        };

        let version = byte_order.read_u16(reader)?;
        if version != TIFF_MAGIC {
            return Err(Error::InvalidVersion(version));
        }

        let first_ifd_offset = byte_order.read_u32(reader)?;

        Ok(TiffHeader {
            byte_order,
            first_ifd_offset,
        })
    }

    pub fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.byte_order.mark());
        self.byte_order.write_u16(buffer, TIFF_MAGIC);
        self.byte_order.write_u32(buffer, self.first_ifd_offset);
    }
}

impl DataType {
    /// Size in bytes of one component.
    pub fn width(self) -> u32 {
        match self {
            DataType::Byte => 1,
            DataType::Ascii => 1,
            DataType::Short => 2,
            DataType::Long => 4,
            DataType::Rational => 8,
            DataType::Undefined => 1,
            DataType::SLong => 4,
            DataType::SRational => 8,
        }
    }
}

impl IfdType {
    /// The kind of directory reached through this directory's next-IFD offset.
    pub fn next_in_chain(self) -> IfdType {
        match self {
            IfdType::Ifd0 => IfdType::Ifd1,
            IfdType::MpIndex => IfdType::MpAttribute,
            other => other,
        }
    }
}

impl Tag {
    pub fn data_size(&self) -> u64 {
        self.component_count as u64 * self.data_type.width() as u64
    }

    /// Whether the entry's 4-byte slot holds an offset rather than the value itself.
    pub fn has_offset_slot(&self) -> bool {
        self.data_size() > 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_in_both_orders() {
        for byte_order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let header = TiffHeader { byte_order, first_ifd_offset: 8 };
            let mut bytes = Vec::new();
            header.write_to(&mut bytes);
            assert_eq!(bytes.len(), TIFF_HEADER_SIZE as usize);

            let parsed = TiffHeader::from_reader(&mut bytes.as_slice()).unwrap();
            assert_eq!(parsed, header);
        }
    }

    #[test]
    fn header_rejects_bad_byte_order() {
        let bytes = [0x49, 0x4D, 0x00, 0x2A, 0, 0, 0, 8];
        let err = TiffHeader::from_reader(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidByteOrder(0x494D)));
    }

    #[test]
    fn header_rejects_bigtiff() {
        let bytes = [0x4D, 0x4D, 0x00, 0x2B, 0, 8, 0, 0];
        let err = TiffHeader::from_reader(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(43)));
    }

    #[test]
    fn rational_tag_uses_offset_slot() {
        let tag = Tag {
            ifd: IfdType::Ifd0,
            id: 0x011A,
            data_type: DataType::Rational,
            component_count: 2,
        };
        assert_eq!(tag.data_size(), 16);
        assert!(tag.has_offset_slot());

        let short = Tag { data_type: DataType::Short, ..tag };
        assert_eq!(short.data_size(), 4);
        assert!(!short.has_offset_slot());
    }

    #[test]
    fn rationals_print_as_fractions() {
        assert_eq!(Rational { numerator: 72, denominator: 1 }.to_string(), "72/1");
        assert_eq!(SRational { numerator: -3, denominator: 10 }.to_string(), "-3/10");
    }
}
