
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::ifd_writer::IfdBuilder;
use crate::jpeg;
use crate::mpo::{MP_ENTRY_SIZE, MP_FORMAT_VERSION, MpAttributes, MpEntry, MpoData, MpoImage, UNIQUE_ID_SIZE};
use crate::tags;
use crate::tiff::{ByteOrder, TIFF_HEADER_SIZE, TiffHeader};

/// Writes `mpo` to `out` and returns the number of bytes written.
///
/// `out` is consumed and dropped before returning, on success and on failure alike. Pass
/// `&mut sink` to keep a sink open afterwards.
pub fn write_mpo<W: Write>(mpo: Option<&MpoData>, out: Option<W>) -> Result<u64> {
    let Some(mpo) = mpo else {
        return Err(Error::InvalidArgument("MPO data is missing"));
    };
    let Some(out) = out else {
        return Err(Error::InvalidArgument("output stream is missing"));
    };

    MpoWriter::new(out).write(mpo)
}

/// Writes `mpo` to a new file at `path`.
pub fn write_mpo_file<P: AsRef<Path>>(mpo: &MpoData, path: P) -> Result<u64> {
    let file = File::create(path.as_ref()).map_err(|e| {
        warn!("Failed to create {}: {}", path.as_ref().display(), e);
        e
    })?;
    MpoWriter::new(BufWriter::new(file)).write(mpo)
}

/// Streams the images of an [`MpoData`] to a sink, each with its APP2 MPF segment.
///
/// The first image carries the MP Index IFD chained to its own MP Attribute IFD; every
/// other image carries its own MP Attribute IFD.
pub struct MpoWriter<W: Write> {
    out: W,
    byte_order: ByteOrder,
    /// Headers of the image being written; flushed and cleared once per image.
    buffer: Vec<u8>,
    written: u64,
}

/// Where each image's MPF segment goes and what it contains.
struct ImagePlan<'a> {
    image: &'a MpoImage,
    insertion_point: usize,
    app2: Vec<u8>,
}

impl<W: Write> MpoWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            byte_order: ByteOrder::BigEndian,
            buffer: Vec::new(),
            written: 0,
        }
    }

    /// Byte order of the MPF TIFF structures. Defaults to big-endian.
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Writes every image and returns the total byte count. The sink is dropped on return.
    pub fn write(mut self, mpo: &MpoData) -> Result<u64> {
        let plans = plan(mpo, self.byte_order)?;

        match self.write_images(&plans) {
            Ok(()) => Ok(self.written),
            Err(e) => {
                warn!("I/O error while writing MPO after {} bytes: {}", self.written, e);
                Err(e)
            }
        }
    }

    fn write_images(&mut self, plans: &[ImagePlan<'_>]) -> Result<()> {
        for plan in plans {
            let jpeg_bytes = &plan.image.jpeg;
            self.buffer.extend_from_slice(&jpeg_bytes[..plan.insertion_point]);
            self.buffer.extend_from_slice(&plan.app2);
            self.flush_buffer()?;

            let rest = &jpeg_bytes[plan.insertion_point..];
            self.out.write_all(rest)?;
            self.written += rest.len() as u64;
        }
        self.out.flush()?;
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        self.out.write_all(&self.buffer)?;
        self.written += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

fn attribute_ifd(index: usize, attributes: &MpAttributes, byte_order: ByteOrder) -> IfdBuilder {
    let mut ifd = IfdBuilder::new(byte_order);
    ifd.push_undefined(tags::MP_FORMAT_VERSION, MP_FORMAT_VERSION)
        .push_long(tags::MP_INDIVIDUAL_NUM, &[index as u32 + 1]);

    if let Some(value) = attributes.pan_orientation {
        ifd.push_long(tags::PAN_ORIENTATION, &[value]);
    }
    if let Some(value) = attributes.pan_overlap_h {
        ifd.push_rational(tags::PAN_OVERLAP_H, &[value]);
    }
    if let Some(value) = attributes.pan_overlap_v {
        ifd.push_rational(tags::PAN_OVERLAP_V, &[value]);
    }
    if let Some(value) = attributes.base_viewpoint_num {
        ifd.push_long(tags::BASE_VIEWPOINT_NUM, &[value]);
    }
    if let Some(value) = attributes.convergence_angle {
        ifd.push_srational(tags::CONVERGENCE_ANGLE, &[value]);
    }
    if let Some(value) = attributes.baseline_length {
        ifd.push_rational(tags::BASELINE_LENGTH, &[value]);
    }

    let signed = [
        (tags::VERTICAL_DIVERGENCE, attributes.vertical_divergence),
        (tags::AXIS_DISTANCE_X, attributes.axis_distance_x),
        (tags::AXIS_DISTANCE_Y, attributes.axis_distance_y),
        (tags::AXIS_DISTANCE_Z, attributes.axis_distance_z),
        (tags::YAW_ANGLE, attributes.yaw_angle),
        (tags::PITCH_ANGLE, attributes.pitch_angle),
        (tags::ROLL_ANGLE, attributes.roll_angle),
    ];
    for (id, value) in signed {
        if let Some(value) = value {
            ifd.push_srational(id, &[value]);
        }
    }

    ifd
}

fn unique_id_list(ids: &[String], num_images: usize) -> Result<Vec<u8>> {
    if ids.len() != num_images {
        return Err(Error::InvalidArgument("unique ID count differs from image count"));
    }

    let mut bytes = Vec::with_capacity(ids.len() * UNIQUE_ID_SIZE);
    for id in ids {
        if id.len() >= UNIQUE_ID_SIZE {
            return Err(Error::InvalidArgument("unique ID longer than 32 bytes"));
        }
        let mut record = [0u8; UNIQUE_ID_SIZE];
        record[..id.len()].copy_from_slice(id.as_bytes());
        bytes.extend_from_slice(&record);
    }
    Ok(bytes)
}

fn mpf_payload(byte_order: ByteOrder, ifds: &[&IfdBuilder]) -> Result<Vec<u8>> {
    let mut payload = jpeg::MPF_IDENTIFIER.to_vec();
    let mut tiff = Vec::new();
    TiffHeader { byte_order, first_ifd_offset: TIFF_HEADER_SIZE }.write_to(&mut tiff);

    let mut offset = TIFF_HEADER_SIZE;
    for (i, ifd) in ifds.iter().enumerate() {
        let next_offset = if i + 1 < ifds.len() { offset + ifd.encoded_len() } else { 0 };
        ifd.write_to(&mut tiff, offset, next_offset)?;
        offset += ifd.encoded_len();
    }

    payload.extend_from_slice(&tiff);
    Ok(payload)
}

/// Lays out every image: builds the IFDs, sizes the APP2 segments and fills in the MP Entry
/// offsets, which depend on all of them.
fn plan(mpo: &MpoData, byte_order: ByteOrder) -> Result<Vec<ImagePlan<'_>>> {
    let num_images = mpo.num_images();
    let images: Vec<&MpoImage> = mpo.images().collect();

    let mut insertion_points = Vec::with_capacity(num_images);
    for image in &images {
        if !jpeg::starts_with_soi(&image.jpeg) {
            return Err(Error::InvalidArgument("image does not start with SOI"));
        }
        insertion_points.push(jpeg::mpf_insertion_point(&image.jpeg)?);
    }

    let attribute_ifds: Vec<IfdBuilder> = images
        .iter()
        .enumerate()
        .map(|(i, image)| attribute_ifd(i, &image.attributes, byte_order))
        .collect();

    let mut index_ifd = IfdBuilder::new(byte_order);
    index_ifd
        .push_undefined(tags::MP_FORMAT_VERSION, MP_FORMAT_VERSION)
        .push_long(tags::NUMBER_OF_IMAGES, &[num_images as u32])
        .push_undefined(tags::MP_ENTRY, &vec![0u8; MP_ENTRY_SIZE * num_images]);
    if let Some(ids) = &mpo.unique_ids {
        index_ifd.push_undefined(tags::IMAGE_UNIQUE_ID_LIST, &unique_id_list(ids, num_images)?);
    }
    if let Some(frames) = mpo.captured_frames {
        index_ifd.push_long(tags::TOTAL_NUMBER_OF_CAPTURED_FRAMES, &[frames]);
    }

    // The MP Entry table has a fixed size, so every segment length is known before its content.
    let segment_len = |ifds_len: u32| 4 + jpeg::MPF_IDENTIFIER.len() as u64 + TIFF_HEADER_SIZE as u64 + ifds_len as u64;
    let mut sizes = Vec::with_capacity(num_images);
    for (i, image) in images.iter().enumerate() {
        let ifds_len = if i == 0 {
            index_ifd.encoded_len() + attribute_ifds[0].encoded_len()
        } else {
            attribute_ifds[i].encoded_len()
        };
        let size = image.jpeg.len() as u64 + segment_len(ifds_len);
        sizes.push(u32::try_from(size).map_err(|_| Error::InvalidArgument("image exceeds 4 GiB"))?);
    }

    // Offsets are relative to the MP header: the TIFF header inside the first APP2 segment.
    let mp_header = (insertion_points[0] + 4 + jpeg::MPF_IDENTIFIER.len()) as u64;
    let mut entries = Vec::with_capacity(MP_ENTRY_SIZE * num_images);
    let mut image_start = 0u64;
    for (i, image) in images.iter().enumerate() {
        let offset = if i == 0 { 0 } else { image_start - mp_header };
        let offset = u32::try_from(offset).map_err(|_| Error::InvalidArgument("MPO exceeds 4 GiB"))?;

        let mut entry = MpEntry::new(image.image_type, sizes[i], offset);
        entry.set_representative(i == 0);
        entry.write_to(byte_order, &mut entries);

        image_start += sizes[i] as u64;
    }
    index_ifd.push_undefined(tags::MP_ENTRY, &entries);
    debug!("MPO layout: {} images, sizes {:?}, MP header at {}", num_images, sizes, mp_header);

    let mut plans = Vec::with_capacity(num_images);
    for (i, &image) in images.iter().enumerate() {
        let payload = if i == 0 {
            mpf_payload(byte_order, &[&index_ifd, &attribute_ifds[0]])?
        } else {
            mpf_payload(byte_order, &[&attribute_ifds[i]])?
        };
        plans.push(ImagePlan {
            image,
            insertion_point: insertion_points[i],
            app2: jpeg::app_segment(jpeg::APP2, &payload)?,
        });
    }

    Ok(plans)
}
