
// https://web.archive.org/web/20160405200235/http://cipa.jp/std/documents/e/DC-007_E.pdf

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use log::trace;

use crate::error::{Error, Result};
use crate::jpeg;
use crate::mpo::{MP_ENTRY_SIZE, MP_FORMAT_VERSION, MpAttributes, MpEntry, MpoData, MpoImage, UNIQUE_ID_SIZE};
use crate::parser::{IfdEvent, IfdParser, TiffStream};
use crate::tags;
use crate::tiff::{ByteOrder, IfdType, Rational, SRational};
use crate::value::TagValue;

/// The Multi-Picture Format (MPF) information of the first image of an MPO file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpfIndex {
    pub byte_order: ByteOrder,
    pub entries: Vec<MpEntry>,
    pub unique_ids: Option<Vec<String>>,
    pub captured_frames: Option<u32>,
    /// Attributes of the first image, from the Attribute IFD chained after the index.
    pub attributes: Option<MpAttributes>,
}

type TagValues = BTreeMap<u16, TagValue>;

/// Reads every value of the directory under `parser`. A directory chained after an MP Index
/// IFD is read too and returned as the second element.
fn read_directory<R: Read + Seek>(parser: &mut IfdParser<'_, R>) -> Result<(TagValues, Option<TagValues>)> {
    let mut values = TagValues::new();
    let mut chained = None;
    loop {
        match parser.next()? {
            IfdEvent::NewTag => {
                let tag = parser.read_tag()?;
                if tag.has_offset_slot() {
                    let offset = parser.read_unsigned_int()?;
                    parser.wait_value_of_tag(tag, offset);
                } else {
                    values.insert(tag.id, parser.read_value(&tag)?);
                }
            }
            IfdEvent::ValueOfPrevTag => {
                let tag = parser.corresponding_tag().ok_or(Error::InvalidState("deferred value without a tag"))?;
                values.insert(tag.id, parser.read_value(&tag)?);
            }
            IfdEvent::NextIfd => {
                if parser.ifd_type() == IfdType::MpIndex {
                    let mut child = parser.parse_ifd_block()?;
                    let (child_values, _) = read_directory(&mut child)?;
                    chained = Some(child_values);
                }
            }
            IfdEvent::End => break,
        }
    }
    Ok((values, chained))
}

fn check_version(values: &TagValues) -> Result<()> {
    match values.get(&tags::MP_FORMAT_VERSION).and_then(TagValue::as_undefined) {
        Some(version) if version == MP_FORMAT_VERSION.as_slice() => Ok(()),
        Some(_) => Err(Error::MalformedMpf("unsupported MP format version")),
        None => Err(Error::MalformedMpf("missing MP format version")),
    }
}

fn first_long(values: &TagValues, id: u16) -> Option<u32> {
    values.get(&id).and_then(TagValue::as_long).and_then(|longs| longs.first().copied())
}

fn first_rational(values: &TagValues, id: u16) -> Option<Rational> {
    match values.get(&id) {
        Some(TagValue::Rational(rationals)) => rationals.first().copied(),
        _ => None,
    }
}

fn first_srational(values: &TagValues, id: u16) -> Option<SRational> {
    match values.get(&id) {
        Some(TagValue::SRational(rationals)) => rationals.first().copied(),
        _ => None,
    }
}

impl MpAttributes {
    fn from_values(values: &TagValues) -> Self {
        Self {
            pan_orientation: first_long(values, tags::PAN_ORIENTATION),
            pan_overlap_h: first_rational(values, tags::PAN_OVERLAP_H),
            pan_overlap_v: first_rational(values, tags::PAN_OVERLAP_V),
            base_viewpoint_num: first_long(values, tags::BASE_VIEWPOINT_NUM),
            convergence_angle: first_srational(values, tags::CONVERGENCE_ANGLE),
            baseline_length: first_rational(values, tags::BASELINE_LENGTH),
            vertical_divergence: first_srational(values, tags::VERTICAL_DIVERGENCE),
            axis_distance_x: first_srational(values, tags::AXIS_DISTANCE_X),
            axis_distance_y: first_srational(values, tags::AXIS_DISTANCE_Y),
            axis_distance_z: first_srational(values, tags::AXIS_DISTANCE_Z),
            yaw_angle: first_srational(values, tags::YAW_ANGLE),
            pitch_angle: first_srational(values, tags::PITCH_ANGLE),
            roll_angle: first_srational(values, tags::ROLL_ANGLE),
        }
    }

    /// Parses a stand-alone MP Attribute IFD: the TIFF structure of the MPF segment of an
    /// image other than the first.
    pub fn from_tiff_bytes(mpf_tiff_bytes: &[u8]) -> Result<Self> {
        let mut stream = TiffStream::new(Cursor::new(mpf_tiff_bytes))?;
        let mut parser = stream.parse(IfdType::MpAttribute)?;
        let (values, _) = read_directory(&mut parser)?;
        check_version(&values)?;
        Ok(Self::from_values(&values))
    }
}

impl MpfIndex {
    /// Number of images declared by the MP Entry table.
    pub fn num_images(&self) -> usize {
        self.entries.len()
    }

    /// Parses the TIFF structure of the MPF segment of the first image.
    pub fn from_tiff_bytes(mpf_tiff_bytes: &[u8]) -> Result<Self> {
        let mut stream = TiffStream::new(Cursor::new(mpf_tiff_bytes))?;
        let byte_order = stream.byte_order();
        let mut parser = stream.parse(IfdType::MpIndex)?;
        let (values, chained) = read_directory(&mut parser)?;
        check_version(&values)?;

        let number_of_images = first_long(&values, tags::NUMBER_OF_IMAGES)
            .ok_or(Error::MalformedMpf("missing number of images"))? as usize;

        let entry_bytes = values
            .get(&tags::MP_ENTRY)
            .and_then(TagValue::as_undefined)
            .ok_or(Error::MalformedMpf("missing MP entries"))?;
        if Some(entry_bytes.len()) != number_of_images.checked_mul(MP_ENTRY_SIZE) {
            return Err(Error::MalformedMpf("MP entry size does not match the number of images"));
        }

        let mut entries = Vec::with_capacity(number_of_images);
        for record in entry_bytes.chunks_exact(MP_ENTRY_SIZE) {
            let record: &[u8; MP_ENTRY_SIZE] = record.try_into().map_err(|_| Error::MalformedMpf("short MP entry"))?;
            entries.push(MpEntry::from_bytes(byte_order, record));
        }

        let unique_ids = values.get(&tags::IMAGE_UNIQUE_ID_LIST).and_then(TagValue::as_undefined).map(|bytes| {
            bytes
                .chunks_exact(UNIQUE_ID_SIZE)
                .map(|record| {
                    let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
                    String::from_utf8_lossy(&record[..end]).into_owned()
                })
                .collect()
        });

        let attributes = match chained {
            Some(chained) => {
                check_version(&chained)?;
                Some(MpAttributes::from_values(&chained))
            }
            None => None,
        };

        Ok(Self {
            byte_order,
            entries,
            unique_ids,
            captured_frames: first_long(&values, tags::TOTAL_NUMBER_OF_CAPTURED_FRAMES),
            attributes,
        })
    }
}

/// Removes the APP2 MPF segment of `image_bytes`, returning the TIFF bytes it held and the
/// remaining JPEG.
fn strip_mpf_segment(image_bytes: &[u8]) -> Result<(&[u8], Vec<u8>)> {
    let segment = jpeg::find_segment(image_bytes, jpeg::APP2, jpeg::MPF_IDENTIFIER)?
        .ok_or(Error::MissingSegment("APP2 MPF"))?;
    let tiff_bytes = &segment.payload(image_bytes)[jpeg::MPF_IDENTIFIER.len()..];

    let mut jpeg_bytes = Vec::with_capacity(image_bytes.len() - (segment.end() - segment.offset));
    jpeg_bytes.extend_from_slice(&image_bytes[..segment.offset]);
    jpeg_bytes.extend_from_slice(&image_bytes[segment.end()..]);
    Ok((tiff_bytes, jpeg_bytes))
}

/// Decodes an MPO file into the images and metadata it was written from.
///
/// Each image is cut out with its MP Entry and returned without its MPF segment.
pub fn read_mpo(mpo_bytes: &[u8]) -> Result<MpoData> {
    let segment = jpeg::find_segment(mpo_bytes, jpeg::APP2, jpeg::MPF_IDENTIFIER)?
        .ok_or(Error::MissingSegment("APP2 MPF"))?;
    let mp_header = segment.payload_offset() + jpeg::MPF_IDENTIFIER.len();
    let index = MpfIndex::from_tiff_bytes(&mpo_bytes[mp_header..segment.end()])?;
    trace!("MP index: {} images, {:?}", index.num_images(), index.byte_order);

    let mut images = Vec::with_capacity(index.num_images());
    for (i, entry) in index.entries.iter().enumerate() {
        if entry.size == 0 {
            return Err(Error::MalformedMpf("empty MP entry"));
        }
        let start = match (i, entry.offset) {
            (0, _) => 0,
            (_, 0) => return Err(Error::MalformedMpf("only the first MP entry may have offset 0")),
            (_, offset) => mp_header + offset as usize,
        };
        let end = start
            .checked_add(entry.size as usize)
            .filter(|&end| end <= mpo_bytes.len())
            .ok_or(Error::MalformedMpf("MP entry points past the end of the file"))?;

        let (tiff_bytes, jpeg_bytes) = strip_mpf_segment(&mpo_bytes[start..end])?;
        let attributes = if i == 0 {
            index.attributes.unwrap_or_default()
        } else {
            MpAttributes::from_tiff_bytes(tiff_bytes)?
        };

        images.push(MpoImage {
            jpeg: jpeg_bytes,
            image_type: entry.image_type(),
            attributes,
        });
    }

    let mut images = images.into_iter();
    let primary = images.next().ok_or(Error::MalformedMpf("no images"))?;
    Ok(MpoData {
        primary,
        auxiliaries: images.collect(),
        unique_ids: index.unique_ids,
        captured_frames: index.captured_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd_writer::IfdBuilder;
    use crate::jpeg::tests::tiny_jpeg;
    use crate::mpo::MpImageType;
    use crate::mpo_writer::{MpoWriter, write_mpo};
    use crate::tiff::TiffHeader;

    fn panorama() -> MpoData {
        let attributes = |orientation| MpAttributes {
            pan_orientation: Some(orientation),
            pan_overlap_h: Some(Rational { numerator: 30, denominator: 100 }),
            pitch_angle: Some(SRational { numerator: -5, denominator: 1 }),
            ..Default::default()
        };
        let mut data = MpoData::new(
            MpoImage::new(tiny_jpeg(&[], &[0x01, 0x02]), MpImageType::BaselinePrimary).with_attributes(attributes(0x0001_0201)),
        );
        data.add_auxiliary(MpoImage::new(tiny_jpeg(&[], &[0x03]), MpImageType::MultiFramePanorama).with_attributes(attributes(0x0001_0202)));
        data.add_auxiliary(MpoImage::new(tiny_jpeg(&[], &[0x04, 0x05, 0x06]), MpImageType::MultiFramePanorama));
        data.unique_ids = Some(vec!["first".into(), "second".into(), "third".into()]);
        data.captured_frames = Some(3);
        data
    }

    #[test]
    fn reads_back_what_was_written() {
        for byte_order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let data = panorama();
            let mut bytes = Vec::new();
            MpoWriter::new(&mut bytes).with_byte_order(byte_order).write(&data).unwrap();
            assert_eq!(read_mpo(&bytes).unwrap(), data);
        }
    }

    #[test]
    fn index_describes_every_image() {
        let data = panorama();
        let mut bytes = Vec::new();
        write_mpo(Some(&data), Some(&mut bytes)).unwrap();

        let segment = jpeg::find_segment(&bytes, jpeg::APP2, jpeg::MPF_IDENTIFIER).unwrap().unwrap();
        let index = MpfIndex::from_tiff_bytes(&segment.payload(&bytes)[4..]).unwrap();
        assert_eq!(index.byte_order, ByteOrder::BigEndian);
        assert_eq!(index.num_images(), 3);
        assert!(index.entries[0].is_representative());
        assert_eq!(index.entries[0].offset, 0);
        assert!(!index.entries[1].is_representative());
        assert_eq!(index.entries.iter().map(|e| e.size as usize).sum::<usize>(), bytes.len());
        assert_eq!(index.captured_frames, Some(3));
        assert_eq!(index.attributes, Some(data.primary.attributes));

        // Each entry lands on an SOI.
        let mp_header = segment.payload_offset() + 4;
        for entry in &index.entries[1..] {
            assert!(jpeg::starts_with_soi(&bytes[mp_header + entry.offset as usize..]));
        }
    }

    #[test]
    fn attribute_ifd_alone() {
        let mut ifd = IfdBuilder::new(ByteOrder::LittleEndian);
        ifd.push_undefined(tags::MP_FORMAT_VERSION, b"0100")
            .push_long(tags::MP_INDIVIDUAL_NUM, &[2])
            .push_long(tags::BASE_VIEWPOINT_NUM, &[1])
            .push_srational(tags::CONVERGENCE_ANGLE, &[SRational { numerator: 2, denominator: 1 }]);
        let mut bytes = Vec::new();
        TiffHeader { byte_order: ByteOrder::LittleEndian, first_ifd_offset: 8 }.write_to(&mut bytes);
        ifd.write_to(&mut bytes, 8, 0).unwrap();

        let attributes = MpAttributes::from_tiff_bytes(&bytes).unwrap();
        assert_eq!(attributes.base_viewpoint_num, Some(1));
        assert_eq!(attributes.convergence_angle, Some(SRational { numerator: 2, denominator: 1 }));
        assert_eq!(attributes.yaw_angle, None);
    }

    #[test]
    fn rejects_bad_index() {
        let mut ifd = IfdBuilder::new(ByteOrder::BigEndian);
        ifd.push_undefined(tags::MP_FORMAT_VERSION, b"0100")
            .push_long(tags::NUMBER_OF_IMAGES, &[2])
            .push_undefined(tags::MP_ENTRY, &[0u8; 16]);
        let mut bytes = Vec::new();
        TiffHeader { byte_order: ByteOrder::BigEndian, first_ifd_offset: 8 }.write_to(&mut bytes);
        ifd.write_to(&mut bytes, 8, 0).unwrap();
        assert!(matches!(MpfIndex::from_tiff_bytes(&bytes), Err(Error::MalformedMpf(_))));

        ifd.push_undefined(tags::MP_FORMAT_VERSION, b"0200");
        let mut bytes = Vec::new();
        TiffHeader { byte_order: ByteOrder::BigEndian, first_ifd_offset: 8 }.write_to(&mut bytes);
        ifd.write_to(&mut bytes, 8, 0).unwrap();
        assert!(matches!(MpfIndex::from_tiff_bytes(&bytes), Err(Error::MalformedMpf(_))));
    }

    /// Writes `data`, then rewrites the MP Entry of image `index` through `patch`.
    fn patched_mpo(data: &MpoData, index: usize, patch: impl FnOnce(&mut MpEntry)) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_mpo(Some(data), Some(&mut bytes)).unwrap();

        let segment = jpeg::find_segment(&bytes, jpeg::APP2, jpeg::MPF_IDENTIFIER).unwrap().unwrap();
        let mp_header = segment.payload_offset() + jpeg::MPF_IDENTIFIER.len();
        let mpf_index = MpfIndex::from_tiff_bytes(&bytes[mp_header..segment.end()]).unwrap();
        let mut entry = mpf_index.entries[index];
        patch(&mut entry);

        let mut table = Vec::new();
        for original in &mpf_index.entries {
            original.write_to(ByteOrder::BigEndian, &mut table);
        }
        let position = bytes[mp_header..]
            .windows(table.len())
            .position(|window| window == table.as_slice())
            .unwrap();
        let at = mp_header + position + MP_ENTRY_SIZE * index;
        let mut record = Vec::new();
        entry.write_to(ByteOrder::BigEndian, &mut record);
        bytes[at..at + MP_ENTRY_SIZE].copy_from_slice(&record);
        bytes
    }

    #[test]
    fn rejects_entries_outside_the_file() {
        let data = panorama();
        let bytes = patched_mpo(&data, 2, |entry| entry.size += 1);
        assert!(matches!(read_mpo(&bytes), Err(Error::MalformedMpf(_))));

        let bytes = patched_mpo(&data, 1, |entry| entry.offset = u32::MAX);
        assert!(matches!(read_mpo(&bytes), Err(Error::MalformedMpf(_))));
    }

    #[test]
    fn rejects_zero_offset_after_the_first_entry() {
        let bytes = patched_mpo(&panorama(), 1, |entry| entry.offset = 0);
        assert!(matches!(read_mpo(&bytes), Err(Error::MalformedMpf(_))));
    }

    #[test]
    fn rejects_empty_entries() {
        for index in [0, 2] {
            let bytes = patched_mpo(&panorama(), index, |entry| entry.size = 0);
            assert!(matches!(read_mpo(&bytes), Err(Error::MalformedMpf(_))));
        }
    }

    #[test]
    fn huge_component_count_fails_without_allocating() {
        let mut ifd = IfdBuilder::new(ByteOrder::LittleEndian);
        ifd.push_undefined(tags::MP_FORMAT_VERSION, b"0100")
            .push_srational(tags::YAW_ANGLE, &[SRational { numerator: 1, denominator: 2 }]);
        let mut bytes = Vec::new();
        TiffHeader { byte_order: ByteOrder::LittleEndian, first_ifd_offset: 8 }.write_to(&mut bytes);
        ifd.write_to(&mut bytes, 8, 0).unwrap();

        // Entries are sorted, so YAW_ANGLE is the second one; its count follows id and type.
        let count_at = 8 + 2 + 12 + 4;
        assert_eq!(&bytes[count_at - 4..count_at - 2], &tags::YAW_ANGLE.to_le_bytes());
        bytes[count_at..count_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            MpAttributes::from_tiff_bytes(&bytes),
            Err(Error::MalformedDirectory { .. })
        ));
    }

    #[test]
    fn plain_jpeg_has_no_index() {
        assert!(matches!(read_mpo(&tiny_jpeg(&[], &[0x00])), Err(Error::MissingSegment(_))));
    }
}
