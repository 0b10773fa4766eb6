
//! Tag ids and per-directory tag tables.
//!
//! Only the tags this crate (and a typical camera EXIF block) touches are listed;
//! unknown ids are still parsed, they just have no name.

use crate::tiff::{DataType, IfdType};

pub const IMAGE_WIDTH: u16 = 0x0100;
pub const IMAGE_LENGTH: u16 = 0x0101;
pub const COMPRESSION: u16 = 0x0103;
pub const IMAGE_DESCRIPTION: u16 = 0x010E;
pub const MAKE: u16 = 0x010F;
pub const MODEL: u16 = 0x0110;
pub const ORIENTATION: u16 = 0x0112;
pub const X_RESOLUTION: u16 = 0x011A;
pub const Y_RESOLUTION: u16 = 0x011B;
pub const RESOLUTION_UNIT: u16 = 0x0128;
pub const SOFTWARE: u16 = 0x0131;
pub const DATE_TIME: u16 = 0x0132;
pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
pub const YCBCR_POSITIONING: u16 = 0x0213;
pub const EXIF_IFD_POINTER: u16 = 0x8769;
pub const GPS_IFD_POINTER: u16 = 0x8825;

/// `COMPRESSION` value of an uncompressed thumbnail.
pub const COMPRESSION_UNCOMPRESSED: u16 = 1;
/// `COMPRESSION` value of a JPEG thumbnail.
pub const COMPRESSION_JPEG: u16 = 6;

pub const EXPOSURE_TIME: u16 = 0x829A;
pub const F_NUMBER: u16 = 0x829D;
pub const ISO_SPEED_RATINGS: u16 = 0x8827;
pub const EXIF_VERSION: u16 = 0x9000;
pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const DATE_TIME_DIGITIZED: u16 = 0x9004;
pub const COMPONENTS_CONFIGURATION: u16 = 0x9101;
pub const SHUTTER_SPEED_VALUE: u16 = 0x9201;
pub const APERTURE_VALUE: u16 = 0x9202;
pub const EXPOSURE_BIAS_VALUE: u16 = 0x9204;
pub const FLASH: u16 = 0x9209;
pub const FOCAL_LENGTH: u16 = 0x920A;
pub const MAKER_NOTE: u16 = 0x927C;
pub const FLASHPIX_VERSION: u16 = 0xA000;
pub const COLOR_SPACE: u16 = 0xA001;
pub const PIXEL_X_DIMENSION: u16 = 0xA002;
pub const PIXEL_Y_DIMENSION: u16 = 0xA003;
pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xA005;
pub const WHITE_BALANCE: u16 = 0xA403;
pub const IMAGE_UNIQUE_ID: u16 = 0xA420;

pub const GPS_VERSION_ID: u16 = 0x0000;
pub const GPS_LATITUDE_REF: u16 = 0x0001;
pub const GPS_LATITUDE: u16 = 0x0002;
pub const GPS_LONGITUDE_REF: u16 = 0x0003;
pub const GPS_LONGITUDE: u16 = 0x0004;
pub const GPS_ALTITUDE_REF: u16 = 0x0005;
pub const GPS_ALTITUDE: u16 = 0x0006;
pub const GPS_TIME_STAMP: u16 = 0x0007;
pub const GPS_DATE_STAMP: u16 = 0x001D;

pub const INTEROPERABILITY_INDEX: u16 = 0x0001;
pub const INTEROPERABILITY_VERSION: u16 = 0x0002;

// MP Index IFD. `MP_FORMAT_VERSION` also opens every MP Attribute IFD.
pub const MP_FORMAT_VERSION: u16 = 0xB000;
pub const NUMBER_OF_IMAGES: u16 = 0xB001;
pub const MP_ENTRY: u16 = 0xB002;
pub const IMAGE_UNIQUE_ID_LIST: u16 = 0xB003;
pub const TOTAL_NUMBER_OF_CAPTURED_FRAMES: u16 = 0xB004;

// MP Attribute IFD
pub const MP_INDIVIDUAL_NUM: u16 = 0xB101;
pub const PAN_ORIENTATION: u16 = 0xB201;
pub const PAN_OVERLAP_H: u16 = 0xB202;
pub const PAN_OVERLAP_V: u16 = 0xB203;
pub const BASE_VIEWPOINT_NUM: u16 = 0xB204;
pub const CONVERGENCE_ANGLE: u16 = 0xB205;
pub const BASELINE_LENGTH: u16 = 0xB206;
pub const VERTICAL_DIVERGENCE: u16 = 0xB207;
pub const AXIS_DISTANCE_X: u16 = 0xB208;
pub const AXIS_DISTANCE_Y: u16 = 0xB209;
pub const AXIS_DISTANCE_Z: u16 = 0xB20A;
pub const YAW_ANGLE: u16 = 0xB20B;
pub const PITCH_ANGLE: u16 = 0xB20C;
pub const ROLL_ANGLE: u16 = 0xB20D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagInfo {
    pub id: u16,
    pub name: &'static str,
    /// The type a well-formed writer uses for this tag.
    pub data_type: DataType,
}

const fn info(id: u16, name: &'static str, data_type: DataType) -> TagInfo {
    TagInfo { id, name, data_type }
}

const IMAGE_TAGS: &[TagInfo] = &[
    info(IMAGE_WIDTH, "ImageWidth", DataType::Long),
    info(IMAGE_LENGTH, "ImageLength", DataType::Long),
    info(COMPRESSION, "Compression", DataType::Short),
    info(IMAGE_DESCRIPTION, "ImageDescription", DataType::Ascii),
    info(MAKE, "Make", DataType::Ascii),
    info(MODEL, "Model", DataType::Ascii),
    info(ORIENTATION, "Orientation", DataType::Short),
    info(X_RESOLUTION, "XResolution", DataType::Rational),
    info(Y_RESOLUTION, "YResolution", DataType::Rational),
    info(RESOLUTION_UNIT, "ResolutionUnit", DataType::Short),
    info(SOFTWARE, "Software", DataType::Ascii),
    info(DATE_TIME, "DateTime", DataType::Ascii),
    info(JPEG_INTERCHANGE_FORMAT, "JPEGInterchangeFormat", DataType::Long),
    info(JPEG_INTERCHANGE_FORMAT_LENGTH, "JPEGInterchangeFormatLength", DataType::Long),
    info(YCBCR_POSITIONING, "YCbCrPositioning", DataType::Short),
    info(EXIF_IFD_POINTER, "ExifIFDPointer", DataType::Long),
    info(GPS_IFD_POINTER, "GPSInfoIFDPointer", DataType::Long),
];

const EXIF_TAGS: &[TagInfo] = &[
    info(EXPOSURE_TIME, "ExposureTime", DataType::Rational),
    info(F_NUMBER, "FNumber", DataType::Rational),
    info(ISO_SPEED_RATINGS, "ISOSpeedRatings", DataType::Short),
    info(EXIF_VERSION, "ExifVersion", DataType::Undefined),
    info(DATE_TIME_ORIGINAL, "DateTimeOriginal", DataType::Ascii),
    info(DATE_TIME_DIGITIZED, "DateTimeDigitized", DataType::Ascii),
    info(COMPONENTS_CONFIGURATION, "ComponentsConfiguration", DataType::Undefined),
    info(SHUTTER_SPEED_VALUE, "ShutterSpeedValue", DataType::SRational),
    info(APERTURE_VALUE, "ApertureValue", DataType::Rational),
    info(EXPOSURE_BIAS_VALUE, "ExposureBiasValue", DataType::SRational),
    info(FLASH, "Flash", DataType::Short),
    info(FOCAL_LENGTH, "FocalLength", DataType::Rational),
    info(MAKER_NOTE, "MakerNote", DataType::Undefined),
    info(FLASHPIX_VERSION, "FlashpixVersion", DataType::Undefined),
    info(COLOR_SPACE, "ColorSpace", DataType::Short),
    info(PIXEL_X_DIMENSION, "PixelXDimension", DataType::Long),
    info(PIXEL_Y_DIMENSION, "PixelYDimension", DataType::Long),
    info(INTEROPERABILITY_IFD_POINTER, "InteroperabilityIFDPointer", DataType::Long),
    info(WHITE_BALANCE, "WhiteBalance", DataType::Short),
    info(IMAGE_UNIQUE_ID, "ImageUniqueID", DataType::Ascii),
];

const GPS_TAGS: &[TagInfo] = &[
    info(GPS_VERSION_ID, "GPSVersionID", DataType::Byte),
    info(GPS_LATITUDE_REF, "GPSLatitudeRef", DataType::Ascii),
    info(GPS_LATITUDE, "GPSLatitude", DataType::Rational),
    info(GPS_LONGITUDE_REF, "GPSLongitudeRef", DataType::Ascii),
    info(GPS_LONGITUDE, "GPSLongitude", DataType::Rational),
    info(GPS_ALTITUDE_REF, "GPSAltitudeRef", DataType::Byte),
    info(GPS_ALTITUDE, "GPSAltitude", DataType::Rational),
    info(GPS_TIME_STAMP, "GPSTimeStamp", DataType::Rational),
    info(GPS_DATE_STAMP, "GPSDateStamp", DataType::Ascii),
];

const INTEROPERABILITY_TAGS: &[TagInfo] = &[
    info(INTEROPERABILITY_INDEX, "InteroperabilityIndex", DataType::Ascii),
    info(INTEROPERABILITY_VERSION, "InteroperabilityVersion", DataType::Undefined),
];

const MP_INDEX_TAGS: &[TagInfo] = &[
    info(MP_FORMAT_VERSION, "MPFVersion", DataType::Undefined),
    info(NUMBER_OF_IMAGES, "NumberOfImages", DataType::Long),
    info(MP_ENTRY, "MPEntry", DataType::Undefined),
    info(IMAGE_UNIQUE_ID_LIST, "ImageUIDList", DataType::Undefined),
    info(TOTAL_NUMBER_OF_CAPTURED_FRAMES, "TotalFrames", DataType::Long),
];

const MP_ATTRIBUTE_TAGS: &[TagInfo] = &[
    info(MP_FORMAT_VERSION, "MPFVersion", DataType::Undefined),
    info(MP_INDIVIDUAL_NUM, "MPIndividualNum", DataType::Long),
    info(PAN_ORIENTATION, "PanOrientation", DataType::Long),
    info(PAN_OVERLAP_H, "PanOverlap_H", DataType::Rational),
    info(PAN_OVERLAP_V, "PanOverlap_V", DataType::Rational),
    info(BASE_VIEWPOINT_NUM, "BaseViewpointNum", DataType::Long),
    info(CONVERGENCE_ANGLE, "ConvergenceAngle", DataType::SRational),
    info(BASELINE_LENGTH, "BaselineLength", DataType::Rational),
    info(VERTICAL_DIVERGENCE, "VerticalDivergence", DataType::SRational),
    info(AXIS_DISTANCE_X, "AxisDistance_X", DataType::SRational),
    info(AXIS_DISTANCE_Y, "AxisDistance_Y", DataType::SRational),
    info(AXIS_DISTANCE_Z, "AxisDistance_Z", DataType::SRational),
    info(YAW_ANGLE, "YawAngle", DataType::SRational),
    info(PITCH_ANGLE, "PitchAngle", DataType::SRational),
    info(ROLL_ANGLE, "RollAngle", DataType::SRational),
];

impl IfdType {
    pub fn known_tags(self) -> &'static [TagInfo] {
        match self {
            IfdType::Ifd0 | IfdType::Ifd1 => IMAGE_TAGS,
            IfdType::Exif => EXIF_TAGS,
            IfdType::Gps => GPS_TAGS,
            IfdType::Interoperability => INTEROPERABILITY_TAGS,
            IfdType::MpIndex => MP_INDEX_TAGS,
            IfdType::MpAttribute => MP_ATTRIBUTE_TAGS,
        }
    }
}

pub fn lookup(ifd: IfdType, id: u16) -> Option<&'static TagInfo> {
    ifd.known_tags().iter().find(|info| info.id == id)
}

/// The kind of sub-directory a pointer tag leads to, if `id` is a pointer tag in `ifd`.
pub fn sub_ifd_type(ifd: IfdType, id: u16) -> Option<IfdType> {
    match (ifd, id) {
        (IfdType::Ifd0 | IfdType::Ifd1, EXIF_IFD_POINTER) => Some(IfdType::Exif),
        (IfdType::Ifd0 | IfdType::Ifd1, GPS_IFD_POINTER) => Some(IfdType::Gps),
        (IfdType::Exif, INTEROPERABILITY_IFD_POINTER) => Some(IfdType::Interoperability),
        _ => None,
    }
}
