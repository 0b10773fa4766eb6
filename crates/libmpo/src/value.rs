
use std::fmt;
use std::io::{Read, Seek};

use crate::error::Result;
use crate::parser::IfdParser;
use crate::tiff::{ByteOrder, DataType, Rational, SRational, Tag};

/// A fully read tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<Rational>),
    Undefined(Vec<u8>),
    SLong(Vec<i32>),
    SRational(Vec<SRational>),
}

impl TagValue {
    pub fn data_type(&self) -> DataType {
        match self {
            TagValue::Byte(_) => DataType::Byte,
            TagValue::Ascii(_) => DataType::Ascii,
            TagValue::Short(_) => DataType::Short,
            TagValue::Long(_) => DataType::Long,
            TagValue::Rational(_) => DataType::Rational,
            TagValue::Undefined(_) => DataType::Undefined,
            TagValue::SLong(_) => DataType::SLong,
            TagValue::SRational(_) => DataType::SRational,
        }
    }

    pub fn as_long(&self) -> Option<&[u32]> {
        if let TagValue::Long(ref data) = *self {
            Some(data)
        } else {
            None
        }
    }

    pub fn as_short(&self) -> Option<&[u16]> {
        if let TagValue::Short(ref data) = *self {
            Some(data)
        } else {
            None
        }
    }

    pub fn as_undefined(&self) -> Option<&[u8]> {
        if let TagValue::Undefined(ref data) = *self {
            Some(data)
        } else {
            None
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        if let TagValue::Ascii(ref data) = *self {
            Some(data)
        } else {
            None
        }
    }
}

impl<R: Read + Seek> IfdParser<'_, R> {
    /// Reads the whole value of `tag`.
    ///
    /// Valid right after `read_tag` for a tag whose value is inline, or on the
    /// `ValueOfPrevTag` event of a deferred tag.
    pub fn read_value(&mut self, tag: &Tag) -> Result<TagValue> {
        let count = tag.component_count as u64;
        let byte_order = self.byte_order();
        let value = match tag.data_type {
            DataType::Byte => TagValue::Byte(self.read_value_bytes(None, count)?),
            DataType::Ascii => TagValue::Ascii(self.read_string(tag.component_count)?),
            DataType::Undefined => TagValue::Undefined(self.read_value_bytes(None, count)?),
            DataType::Short => {
                let bytes = self.read_value_bytes(Some(DataType::Short), count * 2)?;
                TagValue::Short(
                    bytes
                        .chunks_exact(2)
                        .map(|chunk| byte_order.u16_from_bytes([chunk[0], chunk[1]]))
                        .collect(),
                )
            }
            DataType::Long => {
                let bytes = self.read_value_bytes(Some(DataType::Long), count * 4)?;
                TagValue::Long(u32_values(byte_order, &bytes).collect())
            }
            DataType::SLong => {
                let bytes = self.read_value_bytes(Some(DataType::SLong), count * 4)?;
                TagValue::SLong(u32_values(byte_order, &bytes).map(|value| value as i32).collect())
            }
            DataType::Rational => {
                let bytes = self.read_value_bytes(Some(DataType::Rational), count * 8)?;
                let words: Vec<u32> = u32_values(byte_order, &bytes).collect();
                TagValue::Rational(
                    words
                        .chunks_exact(2)
                        .map(|pair| Rational { numerator: pair[0], denominator: pair[1] })
                        .collect(),
                )
            }
            DataType::SRational => {
                let bytes = self.read_value_bytes(Some(DataType::SRational), count * 8)?;
                let words: Vec<u32> = u32_values(byte_order, &bytes).collect();
                TagValue::SRational(
                    words
                        .chunks_exact(2)
                        .map(|pair| SRational { numerator: pair[0] as i32, denominator: pair[1] as i32 })
                        .collect(),
                )
            }
        };
        Ok(value)
    }
}

fn u32_values(byte_order: ByteOrder, bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(move |chunk| byte_order.u32_from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i != 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", value)?;
    }
    Ok(())
}

fn join_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, byte) in bytes.iter().enumerate() {
        if i != 0 {
            f.write_str(" ")?;
        }
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Byte(bytes) | TagValue::Undefined(bytes) => join_hex(f, bytes),
            TagValue::Ascii(string) => f.write_str(string.trim()),
            TagValue::Short(values) => join(f, values),
            TagValue::Long(values) => join(f, values),
            TagValue::Rational(values) => join(f, values),
            TagValue::SLong(values) => join(f, values),
            TagValue::SRational(values) => join(f, values),
        }
    }
}
