
use crate::error::{Error, Result};
use crate::tiff::{ByteOrder, DataType, IFD_ENTRY_SIZE, Rational, SRational};

/// Serializes one IFD in the layout `IfdParser` reads:
/// `[count][12-byte entries sorted by tag][next IFD offset][out-of-line values]`.
///
/// Values of at most 4 bytes are stored left-justified in the entry; larger values go
/// to the data area right after the next-IFD field, each padded to an even length.
#[derive(Debug, Clone)]
pub struct IfdBuilder {
    byte_order: ByteOrder,
    entries: Vec<IfdBuilderEntry>,
}

#[derive(Debug, Clone)]
struct IfdBuilderEntry {
    id: u16,
    data_type: DataType,
    count: u32,
    value: Vec<u8>,
}

impl IfdBuilderEntry {
    fn is_inline(&self) -> bool {
        self.value.len() <= 4
    }

    fn padded_len(&self) -> u32 {
        let len = self.value.len() as u32;
        len + (len & 1)
    }
}

impl IfdBuilder {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            entries: Vec::new(),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry; an existing entry with the same tag is replaced.
    fn push(&mut self, id: u16, data_type: DataType, count: u32, value: Vec<u8>) -> &mut Self {
        let entry = IfdBuilderEntry { id, data_type, count, value };
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn push_byte(&mut self, id: u16, values: &[u8]) -> &mut Self {
        self.push(id, DataType::Byte, values.len() as u32, values.to_vec())
    }

    /// Stores `value` with the terminating NUL the format requires.
    pub fn push_ascii(&mut self, id: u16, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.push(id, DataType::Ascii, bytes.len() as u32, bytes)
    }

    pub fn push_undefined(&mut self, id: u16, bytes: &[u8]) -> &mut Self {
        self.push(id, DataType::Undefined, bytes.len() as u32, bytes.to_vec())
    }

    pub fn push_short(&mut self, id: u16, values: &[u16]) -> &mut Self {
        let mut bytes = Vec::with_capacity(values.len() * 2);
        for &value in values {
            self.byte_order.write_u16(&mut bytes, value);
        }
        self.push(id, DataType::Short, values.len() as u32, bytes)
    }

    pub fn push_long(&mut self, id: u16, values: &[u32]) -> &mut Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for &value in values {
            self.byte_order.write_u32(&mut bytes, value);
        }
        self.push(id, DataType::Long, values.len() as u32, bytes)
    }

    pub fn push_slong(&mut self, id: u16, values: &[i32]) -> &mut Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for &value in values {
            self.byte_order.write_u32(&mut bytes, value as u32);
        }
        self.push(id, DataType::SLong, values.len() as u32, bytes)
    }

    pub fn push_rational(&mut self, id: u16, values: &[Rational]) -> &mut Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for value in values {
            self.byte_order.write_u32(&mut bytes, value.numerator);
            self.byte_order.write_u32(&mut bytes, value.denominator);
        }
        self.push(id, DataType::Rational, values.len() as u32, bytes)
    }

    pub fn push_srational(&mut self, id: u16, values: &[SRational]) -> &mut Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for value in values {
            self.byte_order.write_u32(&mut bytes, value.numerator as u32);
            self.byte_order.write_u32(&mut bytes, value.denominator as u32);
        }
        self.push(id, DataType::SRational, values.len() as u32, bytes)
    }

    fn directory_len(&self) -> u32 {
        2 + IFD_ENTRY_SIZE * self.entries.len() as u32 + 4
    }

    /// Total number of bytes `write_to` appends, known before any offsets are fixed.
    pub fn encoded_len(&self) -> u32 {
        let data_area_len: u32 = self.entries
            .iter()
            .filter(|entry| !entry.is_inline())
            .map(IfdBuilderEntry::padded_len)
            .sum();
        self.directory_len() + data_area_len
    }

    /// Appends the directory to `buffer`.
    ///
    /// * `ifd_offset` - Offset of the directory relative to the TIFF header; out-of-line
    ///   value offsets are computed from it.
    /// * `next_ifd_offset` - Offset of the next directory in the chain, or `0`.
    ///
    /// Fails with `InvalidArgument` if the directory holds more than 65535 entries, the most
    /// its count field can express. Nothing is appended in that case.
    pub fn write_to(&self, buffer: &mut Vec<u8>, ifd_offset: u32, next_ifd_offset: u32) -> Result<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| Error::InvalidArgument("more than 65535 directory entries"))?;

        let mut sorted: Vec<&IfdBuilderEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|entry| entry.id);

        let byte_order = self.byte_order;
        byte_order.write_u16(buffer, count);

        let mut data_offset = ifd_offset + self.directory_len();
        for entry in &sorted {
            byte_order.write_u16(buffer, entry.id);
            byte_order.write_u16(buffer, entry.data_type as u16);
            byte_order.write_u32(buffer, entry.count);
            if entry.is_inline() {
                let mut slot = [0u8; 4];
                slot[..entry.value.len()].copy_from_slice(&entry.value);
                buffer.extend_from_slice(&slot);
            } else {
                byte_order.write_u32(buffer, data_offset);
                data_offset += entry.padded_len();
            }
        }

        byte_order.write_u32(buffer, next_ifd_offset);

        for entry in sorted.iter().filter(|entry| !entry.is_inline()) {
            buffer.extend_from_slice(&entry.value);
            if entry.value.len() % 2 == 1 {
                buffer.push(0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_is_six_bytes() {
        let builder = IfdBuilder::new(ByteOrder::BigEndian);
        let mut bytes = Vec::new();
        builder.write_to(&mut bytes, 8, 0).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0]);
        assert_eq!(builder.encoded_len(), 6);
    }

    #[test]
    fn inline_values_are_left_justified() {
        let mut builder = IfdBuilder::new(ByteOrder::BigEndian);
        builder.push_short(0x0112, &[6]);

        let mut bytes = Vec::new();
        builder.write_to(&mut bytes, 8, 0).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x01,
                0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn large_values_go_to_the_data_area() {
        let mut builder = IfdBuilder::new(ByteOrder::LittleEndian);
        builder
            .push_ascii(0x0110, "Pixel")
            .push_rational(0x011A, &[Rational { numerator: 72, denominator: 1 }]);

        let mut bytes = Vec::new();
        builder.write_to(&mut bytes, 8, 0).unwrap();
        assert_eq!(bytes.len() as u32, builder.encoded_len());

        // Directory is 2 + 2 * 12 + 4 = 30 bytes; "Pixel\0" (6 bytes) follows, then the rational.
        let model_offset = u32::from_le_bytes(bytes[2 + 8..2 + 12].try_into().unwrap());
        let resolution_offset = u32::from_le_bytes(bytes[14 + 8..14 + 12].try_into().unwrap());
        assert_eq!(model_offset, 8 + 30);
        assert_eq!(resolution_offset, 8 + 30 + 6);
        assert_eq!(&bytes[30..36], b"Pixel\0");
    }

    #[test]
    fn entries_are_sorted_and_replaced() {
        let mut builder = IfdBuilder::new(ByteOrder::BigEndian);
        builder.push_long(0xB001, &[2]).push_undefined(0xB000, b"0100").push_long(0xB001, &[3]);
        assert_eq!(builder.len(), 2);

        let mut bytes = Vec::new();
        builder.write_to(&mut bytes, 8, 0).unwrap();
        assert_eq!(&bytes[2..4], &[0xB0, 0x00]);
        assert_eq!(&bytes[14..16], &[0xB0, 0x01]);
        assert_eq!(&bytes[22..26], &[0, 0, 0, 3]);
    }

    #[test]
    fn odd_values_are_padded() {
        let mut builder = IfdBuilder::new(ByteOrder::BigEndian);
        builder.push_undefined(0xB002, &[1, 2, 3, 4, 5]).push_ascii(0x010F, "ACME");
        assert_eq!(builder.encoded_len(), 2 + 24 + 4 + 6 + 6);
    }

    #[test]
    fn entry_count_must_fit_the_count_field() {
        let entry = |id| IfdBuilderEntry { id, data_type: DataType::Byte, count: 1, value: vec![0] };
        let mut builder = IfdBuilder {
            byte_order: ByteOrder::BigEndian,
            entries: (0..=u16::MAX).map(entry).collect(),
        };

        let mut bytes = Vec::new();
        assert!(matches!(builder.write_to(&mut bytes, 8, 0), Err(Error::InvalidArgument(_))));
        assert!(bytes.is_empty());

        builder.entries.pop();
        builder.write_to(&mut bytes, 8, 0).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xFF]);
    }
}
