
use derive_more::{Display, Error, From};

use crate::tiff::DataType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// A required input was absent or unusable.
    #[display("Invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] &'static str),

    /// An IFD or one of its 12-byte entries could not be read.
    #[display("Malformed directory at offset {offset}: {reason}")]
    MalformedDirectory { offset: u64, reason: &'static str },

    #[display("Unknown data type {code} for tag 0x{tag:04X}")]
    UnknownDataType { tag: u16, code: u16 },

    /// A typed reader was used on a tag declaring a different data type.
    #[display("Tag 0x{tag:04X} is {found:?} but was read as {expected:?}")]
    TypeMismatch { tag: u16, expected: DataType, found: DataType },

    /// A read went past the end of the value declared by the tag.
    #[display("Read past the end of the value of tag 0x{tag:04X}")]
    ValueOverrun { tag: u16 },

    /// The operation is not valid for the current parser event.
    #[display("Invalid parser state: {_0}")]
    InvalidState(#[error(not(source))] &'static str),

    #[display("Invalid TIFF byte order 0x{_0:04X}")]
    InvalidByteOrder(#[error(not(source))] u16),

    #[display("Invalid TIFF magic number {_0}")]
    InvalidVersion(#[error(not(source))] u16),

    #[display("Not a JPEG stream (missing SOI)")]
    NotJpeg,

    #[display("Malformed JPEG: {_0}")]
    MalformedJpeg(#[error(not(source))] &'static str),

    #[display("Missing {_0} segment")]
    MissingSegment(#[error(not(source))] &'static str),

    #[display("Malformed MPF data: {_0}")]
    MalformedMpf(#[error(not(source))] &'static str),

    #[display("I/O error: {_0}")]
    #[from]
    Io(std::io::Error),
}

impl Error {
    /// `true` for faults raised by the underlying stream rather than by the data.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
