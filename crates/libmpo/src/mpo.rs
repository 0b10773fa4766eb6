
// https://web.archive.org/web/20160405200235/http://cipa.jp/std/documents/e/DC-007_E.pdf

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::tiff::{ByteOrder, Rational, SRational};

/// Value of the MP Format Version tag.
pub const MP_FORMAT_VERSION: &[u8; 4] = b"0100";

/// Size of one MP Entry record.
pub const MP_ENTRY_SIZE: usize = 16;

/// Size of one record of the Image Unique ID list: 32 characters plus NUL.
pub const UNIQUE_ID_SIZE: usize = 33;

const FLAG_DEPENDENT_PARENT: u32 = 0x8000_0000;
const FLAG_DEPENDENT_CHILD: u32 = 0x4000_0000;
const FLAG_REPRESENTATIVE: u32 = 0x2000_0000;
const IMAGE_DATA_FORMAT_MASK: u32 = 0x0700_0000;
const IMAGE_TYPE_MASK: u32 = 0x00FF_FFFF;

/// MP Type code of an individual image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
#[repr(u32)]
pub enum MpImageType {
    #[default]
    Undefined = 0x000000,
    LargeThumbnailVga = 0x010001,
    LargeThumbnailFullHd = 0x010002,
    MultiFramePanorama = 0x020001,
    MultiFrameDisparity = 0x020002,
    MultiFrameMultiAngle = 0x020003,
    BaselinePrimary = 0x030000,
}

/// Per-image attributes stored in an MP Attribute IFD.
///
/// The individual image number is not part of this struct: the writer derives it from the
/// position of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MpAttributes {
    pub pan_orientation: Option<u32>,
    pub pan_overlap_h: Option<Rational>,
    pub pan_overlap_v: Option<Rational>,
    pub base_viewpoint_num: Option<u32>,
    pub convergence_angle: Option<SRational>,
    pub baseline_length: Option<Rational>,
    pub vertical_divergence: Option<SRational>,
    pub axis_distance_x: Option<SRational>,
    pub axis_distance_y: Option<SRational>,
    pub axis_distance_z: Option<SRational>,
    pub yaw_angle: Option<SRational>,
    pub pitch_angle: Option<SRational>,
    pub roll_angle: Option<SRational>,
}

/// One picture of an MPO file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpoImage {
    /// A complete JPEG, SOI to EOI, without an MPF segment.
    pub jpeg: Vec<u8>,
    pub image_type: MpImageType,
    pub attributes: MpAttributes,
}

/// Everything needed to write an MPO file. The writer never modifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpoData {
    pub primary: MpoImage,
    pub auxiliaries: Vec<MpoImage>,
    /// One ID of at most 32 characters per image, in image order.
    pub unique_ids: Option<Vec<String>>,
    pub captured_frames: Option<u32>,
}

/// One record of the MP Entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpEntry {
    pub attribute: u32,
    pub size: u32,
    /// Relative to the MP header of the first image; `0` for the first image itself.
    pub offset: u32,
    pub dependent_image_1: u16,
    pub dependent_image_2: u16,
}

impl MpoImage {
    pub fn new(jpeg: Vec<u8>, image_type: MpImageType) -> Self {
        Self {
            jpeg,
            image_type,
            attributes: MpAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: MpAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl MpoData {
    pub fn new(primary: MpoImage) -> Self {
        Self {
            primary,
            auxiliaries: Vec::new(),
            unique_ids: None,
            captured_frames: None,
        }
    }

    pub fn add_auxiliary(&mut self, image: MpoImage) -> &mut Self {
        self.auxiliaries.push(image);
        self
    }

    pub fn num_images(&self) -> usize {
        1 + self.auxiliaries.len()
    }

    /// The primary image followed by the auxiliary images.
    pub fn images(&self) -> impl Iterator<Item = &MpoImage> {
        std::iter::once(&self.primary).chain(self.auxiliaries.iter())
    }
}

impl MpEntry {
    pub fn new(image_type: MpImageType, size: u32, offset: u32) -> Self {
        Self {
            attribute: image_type as u32,
            size,
            offset,
            dependent_image_1: 0,
            dependent_image_2: 0,
        }
    }

    pub fn image_type(&self) -> MpImageType {
        MpImageType::from_u32(self.attribute & IMAGE_TYPE_MASK).unwrap_or_default()
    }

    /// Image data format; `0` is JPEG.
    pub fn image_data_format(&self) -> u32 {
        (self.attribute & IMAGE_DATA_FORMAT_MASK) >> 24
    }

    pub fn is_representative(&self) -> bool {
        self.attribute & FLAG_REPRESENTATIVE != 0
    }

    pub fn set_representative(&mut self, representative: bool) {
        self.set_flag(FLAG_REPRESENTATIVE, representative);
    }

    pub fn is_dependent_parent(&self) -> bool {
        self.attribute & FLAG_DEPENDENT_PARENT != 0
    }

    pub fn is_dependent_child(&self) -> bool {
        self.attribute & FLAG_DEPENDENT_CHILD != 0
    }

    fn set_flag(&mut self, flag: u32, value: bool) {
        if value {
            self.attribute |= flag;
        } else {
            self.attribute &= !flag;
        }
    }

    pub fn write_to(&self, byte_order: ByteOrder, buffer: &mut Vec<u8>) {
        byte_order.write_u32(buffer, self.attribute);
        byte_order.write_u32(buffer, self.size);
        byte_order.write_u32(buffer, self.offset);
        byte_order.write_u16(buffer, self.dependent_image_1);
        byte_order.write_u16(buffer, self.dependent_image_2);
    }

    /// * `bytes` - Exactly one 16-byte record.
    pub fn from_bytes(byte_order: ByteOrder, bytes: &[u8; MP_ENTRY_SIZE]) -> Self {
        let u32_at = |i: usize| byte_order.u32_from_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let u16_at = |i: usize| byte_order.u16_from_bytes([bytes[i], bytes[i + 1]]);
        Self {
            attribute: u32_at(0),
            size: u32_at(4),
            offset: u32_at(8),
            dependent_image_1: u16_at(12),
            dependent_image_2: u16_at(14),
        }
    }
}
