
use std::io::{Read, Seek, SeekFrom};

use log::trace;

use crate::error::{Error, Result};

pub const MARKER_PREFIX: u8 = 0xFF;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const TEM: u8 = 0x01;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP2: u8 = 0xE2;

pub const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";
pub const MPF_IDENTIFIER: &[u8] = b"MPF\0";

/// A marker segment in the header part of a JPEG (everything before the entropy-coded data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub marker: u8,
    /// Offset of the `0xFF` that opens the segment.
    pub offset: usize,
    /// Size of the segment payload, excluding the marker and the length field.
    pub payload_len: usize,
}

impl Segment {
    pub fn payload_offset(&self) -> usize {
        self.offset + 4
    }

    /// Offset of the first byte after the segment.
    pub fn end(&self) -> usize {
        self.payload_offset() + self.payload_len
    }

    pub fn payload<'a>(&self, jpeg_bytes: &'a [u8]) -> &'a [u8] {
        &jpeg_bytes[self.payload_offset()..self.end()]
    }
}

/// Markers that stand alone, without a length field.
fn is_standalone(marker: u8) -> bool {
    marker == TEM || (0xD0..=0xD7).contains(&marker)
}

pub fn starts_with_soi(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == MARKER_PREFIX && bytes[1] == SOI
}

/// Lists the marker segments following SOI, up to and including the SOS header.
pub fn header_segments(jpeg_bytes: &[u8]) -> Result<Vec<Segment>> {
    if !starts_with_soi(jpeg_bytes) {
        return Err(Error::NotJpeg);
    }

    let mut segments = Vec::new();
    let mut position = 2usize;
    loop {
        if position + 2 > jpeg_bytes.len() {
            return Err(Error::MalformedJpeg("unexpected end of header segments"));
        }
        if jpeg_bytes[position] != MARKER_PREFIX {
            return Err(Error::MalformedJpeg("expected a marker"));
        }
        let marker = jpeg_bytes[position + 1];
        if marker == MARKER_PREFIX {
            // Fill byte.
            position += 1;
            continue;
        }
        if marker == EOI {
            break;
        }
        if is_standalone(marker) {
            position += 2;
            continue;
        }

        if position + 4 > jpeg_bytes.len() {
            return Err(Error::MalformedJpeg("truncated segment length"));
        }
        let length = u16::from_be_bytes([jpeg_bytes[position + 2], jpeg_bytes[position + 3]]) as usize;
        if length < 2 || position + 2 + length > jpeg_bytes.len() {
            return Err(Error::MalformedJpeg("segment length out of bounds"));
        }

        let segment = Segment {
            marker,
            offset: position,
            payload_len: length - 2,
        };
        segments.push(segment);
        position = segment.end();

        if marker == SOS {
            break;
        }
    }

    Ok(segments)
}

/// Finds the first `marker` segment whose payload starts with `identifier`.
pub fn find_segment(jpeg_bytes: &[u8], marker: u8, identifier: &[u8]) -> Result<Option<Segment>> {
    let segment = header_segments(jpeg_bytes)?
        .into_iter()
        .find(|segment| segment.marker == marker && segment.payload(jpeg_bytes).starts_with(identifier));
    Ok(segment)
}

/// Offset at which an APP2 MPF segment goes: after SOI and any leading APP0 (JFIF) / APP1 (Exif, XMP) segments.
pub fn mpf_insertion_point(jpeg_bytes: &[u8]) -> Result<usize> {
    let insertion_point = header_segments(jpeg_bytes)?
        .into_iter()
        .take_while(|segment| segment.marker == APP0 || segment.marker == APP1)
        .last()
        .map_or(2, |segment| segment.end());
    Ok(insertion_point)
}

/// Walks the header segments of a JPEG stream and positions `reader` right after
/// the identifier of the first `marker` segment starting with `identifier`.
///
/// Returns the stream position of that point, or `None` if scanning reached SOS or EOI first.
pub fn seek_to_segment<R: Read + Seek>(reader: &mut R, marker: u8, identifier: &[u8]) -> Result<Option<u64>> {
    let mut soi = [0u8; 2];
    reader.read_exact(&mut soi)?;
    if !starts_with_soi(&soi) {
        return Err(Error::NotJpeg);
    }

    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] != MARKER_PREFIX {
            return Err(Error::MalformedJpeg("expected a marker"));
        }
        let mut current = MARKER_PREFIX;
        while current == MARKER_PREFIX {
            reader.read_exact(&mut byte)?;
            current = byte[0];
        }

        if current == SOS || current == EOI {
            return Ok(None);
        }
        if is_standalone(current) {
            continue;
        }

        let mut length = [0u8; 2];
        reader.read_exact(&mut length)?;
        let payload_len = (u16::from_be_bytes(length) as i64) - 2;
        if payload_len < 0 {
            return Err(Error::MalformedJpeg("segment length out of bounds"));
        }

        if current == marker && payload_len >= identifier.len() as i64 {
            let mut head = vec![0u8; identifier.len()];
            reader.read_exact(&mut head)?;
            if head == identifier {
                let position = reader.stream_position()?;
                trace!("Found segment 0x{:02X} at {}", current, position);
                return Ok(Some(position));
            }
            reader.seek(SeekFrom::Current(payload_len - identifier.len() as i64))?;
        } else {
            reader.seek(SeekFrom::Current(payload_len))?;
        }
    }
}

/// Builds a complete APPn segment from its payload.
pub fn app_segment(marker: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(payload.len() + 2)
        .map_err(|_| Error::InvalidArgument("segment payload exceeds 65533 bytes"))?;

    let mut segment = Vec::with_capacity(payload.len() + 4);
    segment.push(MARKER_PREFIX);
    segment.push(marker);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(payload);
    Ok(segment)
}
