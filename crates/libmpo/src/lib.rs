
//! Reading and writing of the TIFF tag directories found in JPEG files (Exif, MPF), and of
//! Multi-Picture Object (MPO) files built from them.

mod error;
pub mod ifd_writer;
pub mod jpeg;
mod mpf;
mod mpo;
mod mpo_writer;
pub mod parser;
mod split;
pub mod tags;
pub mod tiff;
mod value;

pub use error::{Error, Result};
pub use ifd_writer::IfdBuilder;
pub use mpf::{MpfIndex, read_mpo};
pub use mpo::{MP_ENTRY_SIZE, MpAttributes, MpEntry, MpImageType, MpoData, MpoImage, UNIQUE_ID_SIZE};
pub use mpo_writer::{MpoWriter, write_mpo, write_mpo_file};
pub use parser::{IfdEvent, IfdParser, TiffStream};
pub use split::{Split, StreamSplitter, split_mpo_bytes, split_mpo_file, split_mpo_reader};
pub use tiff::{ByteOrder, DataType, IfdType, Rational, SRational, Tag};
pub use value::TagValue;
