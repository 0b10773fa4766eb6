
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

use log::trace;
use num_traits::FromPrimitive;

use crate::error::{Error, Result};
use crate::jpeg;
use crate::tags;
use crate::tiff::{ByteOrder, DataType, IFD_ENTRY_SIZE, IfdType, Rational, SRational, Tag, TiffHeader};

/// What the parser found on the last call to [`IfdParser::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdEvent {
    /// An unread entry; call [`IfdParser::read_tag`].
    NewTag,
    /// The directory links to another one; call [`IfdParser::parse_ifd_block`] to enter it.
    NextIfd,
    /// The offset of a deferred value was reached; see [`IfdParser::corresponding_tag`].
    ValueOfPrevTag,
    End,
}

/// The byte source shared by every directory parser of one TIFF structure.
pub struct TiffStream<R> {
    reader: R,
    byte_order: ByteOrder,
    /// Stream position of the TIFF header. All TIFF offsets are relative to it.
    base: u64,
    first_ifd_offset: u32,
    visited: HashSet<u32>,
}

impl<R: Read + Seek> TiffStream<R> {
    /// * `reader` - Must be positioned at the start of a TIFF header.
    pub fn new(mut reader: R) -> Result<Self> {
        let base = reader.stream_position()?;
        let header = TiffHeader::from_reader(&mut reader)?;
        trace!("TIFF header at {}: {:?}", base, header);

        Ok(Self {
            reader,
            byte_order: header.byte_order,
            base,
            first_ifd_offset: header.first_ifd_offset,
            visited: HashSet::new(),
        })
    }

    /// Opens the TIFF structure of the APP1 Exif segment of a JPEG stream.
    pub fn from_jpeg(mut reader: R) -> Result<Self> {
        match jpeg::seek_to_segment(&mut reader, jpeg::APP1, jpeg::EXIF_IDENTIFIER)? {
            Some(_) => Self::new(reader),
            None => Err(Error::MissingSegment("APP1 Exif")),
        }
    }

    /// Opens the TIFF structure of the APP2 MPF segment of a JPEG stream.
    pub fn from_mpf_jpeg(mut reader: R) -> Result<Self> {
        match jpeg::seek_to_segment(&mut reader, jpeg::APP2, jpeg::MPF_IDENTIFIER)? {
            Some(_) => Self::new(reader),
            None => Err(Error::MissingSegment("APP2 MPF")),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Stream position that TIFF offsets are relative to.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Starts parsing at the first IFD, which is of kind `ifd_type`.
    pub fn parse(&mut self, ifd_type: IfdType) -> Result<IfdParser<'_, R>> {
        let offset = self.first_ifd_offset;
        IfdParser::open(self, ifd_type, offset)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.base + offset))?;
        Ok(())
    }
}

/// The tag whose value bytes are under the cursor, and how many of them are left.
#[derive(Debug, Clone, Copy)]
struct ValueContext {
    tag: Tag,
    remaining: u64,
    /// The cursor is on the 4-byte offset slot of a tag whose value lives elsewhere.
    offset_slot: bool,
}

/// Pull parser over one IFD.
///
/// Each call to [`next`](Self::next) positions the shared reader for the returned event, so
/// a caller may read all, part or none of an entry before moving on. Values that do not
/// fit in an entry are only visited if the caller registers them with
/// [`wait_value_of_tag`](Self::wait_value_of_tag); they come back as `ValueOfPrevTag`
/// events in increasing offset order once the entries are exhausted.
pub struct IfdParser<'a, R> {
    stream: &'a mut TiffStream<R>,
    ifd_type: IfdType,
    ifd_offset: u32,
    tag_count: u16,
    tags_visited: u16,
    next_ifd_checked: bool,
    next_ifd_offset: u32,
    /// Deferred values keyed by `(offset, registration order)`.
    deferred: BTreeMap<(u64, u32), Tag>,
    registrations: u32,
    event: Option<IfdEvent>,
    /// Tag and offset of the current `ValueOfPrevTag` event.
    deferred_current: Option<(Tag, u64)>,
    value: Option<ValueContext>,
}

impl<'a, R: Read + Seek> IfdParser<'a, R> {
    fn open(stream: &'a mut TiffStream<R>, ifd_type: IfdType, ifd_offset: u32) -> Result<Self> {
        if !stream.visited.insert(ifd_offset) {
            return Err(Error::MalformedDirectory {
                offset: ifd_offset as u64,
                reason: "directory visited twice",
            });
        }

        stream.seek(ifd_offset as u64)?;
        let byte_order = stream.byte_order;
        let tag_count = byte_order.read_u16(&mut stream.reader).map_err(|e| truncated(e, ifd_offset as u64, "missing entry count"))?;
        trace!("{:?} at {}: {} entries", ifd_type, ifd_offset, tag_count);

        Ok(Self {
            stream,
            ifd_type,
            ifd_offset,
            tag_count,
            tags_visited: 0,
            next_ifd_checked: false,
            next_ifd_offset: 0,
            deferred: BTreeMap::new(),
            registrations: 0,
            event: None,
            deferred_current: None,
            value: None,
        })
    }

    pub fn ifd_type(&self) -> IfdType {
        self.ifd_type
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.stream.byte_order
    }

    /// Number of entries declared by the directory.
    pub fn tag_count(&self) -> u16 {
        self.tag_count
    }

    fn entry_offset(&self, index: u16) -> u64 {
        self.ifd_offset as u64 + 2 + IFD_ENTRY_SIZE as u64 * index as u64
    }

    pub fn next(&mut self) -> Result<IfdEvent> {
        self.value = None;
        self.deferred_current = None;

        let event = self.advance()?;
        self.event = Some(event);
        Ok(event)
    }

    fn advance(&mut self) -> Result<IfdEvent> {
        if self.tags_visited < self.tag_count {
            let offset = self.entry_offset(self.tags_visited);
            self.tags_visited += 1;
            self.stream.seek(offset)?;
            return Ok(IfdEvent::NewTag);
        }

        if !self.next_ifd_checked {
            self.next_ifd_checked = true;
            let offset = self.entry_offset(self.tag_count);
            self.stream.seek(offset)?;
            let byte_order = self.stream.byte_order;
            self.next_ifd_offset = byte_order
                .read_u32(&mut self.stream.reader)
                .map_err(|e| truncated(e, offset, "missing next IFD offset"))?;
            if self.next_ifd_offset != 0 {
                return Ok(IfdEvent::NextIfd);
            }
        }

        if let Some(((offset, _), tag)) = self.deferred.pop_first() {
            self.stream.seek(offset)?;
            self.deferred_current = Some((tag, offset));
            self.value = Some(ValueContext {
                tag,
                remaining: tag.data_size(),
                offset_slot: false,
            });
            return Ok(IfdEvent::ValueOfPrevTag);
        }

        Ok(IfdEvent::End)
    }

    /// Reads the header of the entry announced by `NewTag`, leaving the cursor on its
    /// 4-byte value/offset slot.
    pub fn read_tag(&mut self) -> Result<Tag> {
        if self.event != Some(IfdEvent::NewTag) || self.value.is_some() {
            return Err(Error::InvalidState("read_tag is only valid once after NewTag"));
        }

        let offset = self.entry_offset(self.tags_visited - 1);
        let mut entry = [0u8; IFD_ENTRY_SIZE as usize];
        self.stream.seek(offset)?;
        self.stream.reader.read_exact(&mut entry).map_err(|e| truncated(e, offset, "truncated entry"))?;

        let byte_order = self.stream.byte_order;
        let id = byte_order.u16_from_bytes([entry[0], entry[1]]);
        let code = byte_order.u16_from_bytes([entry[2], entry[3]]);
        let component_count = byte_order.u32_from_bytes([entry[4], entry[5], entry[6], entry[7]]);

        let data_type = DataType::from_u16(code).ok_or(Error::UnknownDataType { tag: id, code })?;
        let tag = Tag {
            ifd: self.ifd_type,
            id,
            data_type,
            component_count,
        };

        self.stream.seek(offset + 8)?;
        let offset_slot = tag.has_offset_slot();
        self.value = Some(ValueContext {
            tag,
            remaining: if offset_slot { 4 } else { tag.data_size() },
            offset_slot,
        });
        Ok(tag)
    }

    /// Asks the parser to come back to `tag` once the cursor can reach `offset`.
    ///
    /// Required for every tag whose value lives out of line (or that points to a
    /// sub-directory) if the caller wants to see it; unregistered values are skipped.
    pub fn wait_value_of_tag(&mut self, tag: Tag, offset: u32) {
        self.deferred.insert((offset as u64, self.registrations), tag);
        self.registrations += 1;
    }

    /// Number of deferred values not yet reached.
    pub fn pending_values(&self) -> usize {
        self.deferred.len()
    }

    /// The tag whose deferred value the cursor is on, during a `ValueOfPrevTag` event.
    pub fn corresponding_tag(&self) -> Option<Tag> {
        self.deferred_current.map(|(tag, _)| tag)
    }

    /// Enters the directory announced by the current `NextIfd` event, or pointed to by the
    /// tag of the current `ValueOfPrevTag` event.
    ///
    /// The child shares the byte source but keeps its own deferred values; this parser can
    /// be used again once the child is dropped.
    pub fn parse_ifd_block(&mut self) -> Result<IfdParser<'_, R>> {
        let (ifd_type, offset) = match (self.event, self.deferred_current) {
            (Some(IfdEvent::NextIfd), _) => (self.ifd_type.next_in_chain(), self.next_ifd_offset),
            (Some(IfdEvent::ValueOfPrevTag), Some((tag, offset))) => {
                let ifd_type = tags::sub_ifd_type(self.ifd_type, tag.id)
                    .ok_or(Error::InvalidState("tag does not point to a directory"))?;
                let offset = u32::try_from(offset).map_err(|_| Error::MalformedDirectory {
                    offset,
                    reason: "directory offset out of range",
                })?;
                (ifd_type, offset)
            }
            _ => return Err(Error::InvalidState("parse_ifd_block is only valid on NextIfd or ValueOfPrevTag")),
        };

        self.value = None;
        IfdParser::open(&mut *self.stream, ifd_type, offset)
    }

    /// Moves the cursor to `offset` (relative to the TIFF header) for data that is not
    /// modelled as a tag, such as thumbnail bytes. Reads after this are not type checked.
    pub fn skip_to(&mut self, offset: u32) -> Result<()> {
        self.value = None;
        self.stream.seek(offset as u64)
    }

    fn consume(&mut self, expected: Option<DataType>, width: u64) -> Result<()> {
        let Some(value) = self.value.as_mut() else {
            return Ok(());
        };

        if let Some(expected) = expected {
            // The slot of an out-of-line value holds a `Long` offset, whatever the tag's type.
            let found = if value.offset_slot { DataType::Long } else { value.tag.data_type };
            if found != expected {
                return Err(Error::TypeMismatch {
                    tag: value.tag.id,
                    expected,
                    found,
                });
            }
        }

        if width > value.remaining {
            return Err(Error::ValueOverrun { tag: value.tag.id });
        }
        value.remaining -= width;
        Ok(())
    }

    fn read_raw_u16(&mut self) -> Result<u16> {
        let byte_order = self.stream.byte_order;
        Ok(byte_order.read_u16(&mut self.stream.reader)?)
    }

    fn read_raw_u32(&mut self) -> Result<u32> {
        let byte_order = self.stream.byte_order;
        Ok(byte_order.read_u32(&mut self.stream.reader)?)
    }

    pub fn read_unsigned_short(&mut self) -> Result<u16> {
        self.consume(Some(DataType::Short), 2)?;
        self.read_raw_u16()
    }

    /// Reads a `Long`, or the offset held in the slot of a tag with an out-of-line value.
    pub fn read_unsigned_int(&mut self) -> Result<u32> {
        self.consume(Some(DataType::Long), 4)?;
        self.read_raw_u32()
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.consume(Some(DataType::SLong), 4)?;
        Ok(self.read_raw_u32()? as i32)
    }

    pub fn read_unsigned_rational(&mut self) -> Result<Rational> {
        self.consume(Some(DataType::Rational), 8)?;
        let numerator = self.read_raw_u32()?;
        let denominator = self.read_raw_u32()?;
        Ok(Rational { numerator, denominator })
    }

    pub fn read_rational(&mut self) -> Result<SRational> {
        self.consume(Some(DataType::SRational), 8)?;
        let numerator = self.read_raw_u32()? as i32;
        let denominator = self.read_raw_u32()? as i32;
        Ok(SRational { numerator, denominator })
    }

    /// Reads `n` value bytes. The buffer only grows as far as the stream has data, so a
    /// component count larger than the stream fails instead of allocating it.
    pub(crate) fn read_value_bytes(&mut self, expected: Option<DataType>, n: u64) -> Result<Vec<u8>> {
        self.consume(expected, n)?;
        let offset = self.stream.reader.stream_position()?.saturating_sub(self.stream.base);
        let mut buffer = Vec::new();
        (&mut self.stream.reader).take(n).read_to_end(&mut buffer)?;
        if (buffer.len() as u64) < n {
            return Err(Error::MalformedDirectory {
                offset,
                reason: "value runs past the end of the stream",
            });
        }
        Ok(buffer)
    }

    /// Reads `n` ASCII bytes, dropping the NUL terminator and any padding after it.
    pub fn read_string(&mut self, n: u32) -> Result<String> {
        let mut buffer = self.read_value_bytes(Some(DataType::Ascii), n as u64)?;
        if let Some(end) = buffer.iter().position(|&b| b == 0) {
            buffer.truncate(end);
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Reads raw bytes regardless of the tag's data type.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.consume(None, buffer.len() as u64)?;
        self.stream.reader.read_exact(buffer)?;
        Ok(())
    }
}

fn truncated(error: std::io::Error, offset: u64, reason: &'static str) -> Error {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::MalformedDirectory { offset, reason }
    } else {
        Error::Io(error)
    }
}
