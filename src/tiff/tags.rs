//! TIFF tag tables: names and permitted field types per directory namespace.
//! See TIFF 6.0 Part 1/2, Exif 2.3 section 4.6 and TIFF/EP.

use crate::tiff::ifd::{
    TYPE_ASCII, TYPE_BYTE, TYPE_IFD, TYPE_LONG, TYPE_RATIONAL, TYPE_SHORT, TYPE_SRATIONAL,
    TYPE_UNDEFINED,
};

pub const NEW_SUBFILE_TYPE: u16 = 254;
pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC: u16 = 262;
pub const MAKE: u16 = 271;
pub const MODEL: u16 = 272;
pub const STRIP_OFFSETS: u16 = 273;
pub const ORIENTATION: u16 = 274;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const ROWS_PER_STRIP: u16 = 278;
pub const STRIP_BYTE_COUNTS: u16 = 279;
pub const X_RESOLUTION: u16 = 282;
pub const Y_RESOLUTION: u16 = 283;
pub const RESOLUTION_UNIT: u16 = 296;
pub const DATE_TIME: u16 = 306;
pub const COLOR_MAP: u16 = 320;
pub const TILE_WIDTH: u16 = 322;
pub const TILE_LENGTH: u16 = 323;
pub const TILE_OFFSETS: u16 = 324;
pub const TILE_BYTE_COUNTS: u16 = 325;
pub const SUB_IFDS: u16 = 330;
pub const JPEG_INTERCHANGE_FORMAT: u16 = 513;
pub const EXIF_IFD: u16 = 34665;
pub const GPS_IFD: u16 = 34853;
pub const TIFF_EP_STANDARD_ID: u16 = 37398;
pub const INTEROPERABILITY_IFD: u16 = 40965;
pub const DNG_VERSION: u16 = 50706;

/// One known tag.
#[derive(Debug, Clone, Copy)]
pub struct TagDef {
    pub tag: u16,
    pub name: &'static str,
    /// Field types a writer may use for this tag.
    pub types: &'static [u16],
}

const fn def(tag: u16, name: &'static str, types: &'static [u16]) -> TagDef {
    TagDef { tag, name, types }
}

const SHORT: &[u16] = &[TYPE_SHORT];
const LONG: &[u16] = &[TYPE_LONG];
const SHORT_OR_LONG: &[u16] = &[TYPE_SHORT, TYPE_LONG];
const POINTER: &[u16] = &[TYPE_LONG, TYPE_IFD];
const ASCII: &[u16] = &[TYPE_ASCII];
const RATIONAL: &[u16] = &[TYPE_RATIONAL];
const SRATIONAL: &[u16] = &[TYPE_SRATIONAL];
const BYTE: &[u16] = &[TYPE_BYTE];
const UNDEFINED: &[u16] = &[TYPE_UNDEFINED];

/// Baseline, extension, TIFF/EP, DNG and Exif private tags (one numbering space).
pub const TIFF_TAGS: &[TagDef] = &[
    def(NEW_SUBFILE_TYPE, "NewSubfileType", LONG),
    def(255, "SubfileType", SHORT),
    def(IMAGE_WIDTH, "ImageWidth", SHORT_OR_LONG),
    def(IMAGE_LENGTH, "ImageLength", SHORT_OR_LONG),
    def(BITS_PER_SAMPLE, "BitsPerSample", SHORT),
    def(COMPRESSION, "Compression", SHORT),
    def(PHOTOMETRIC, "PhotometricInterpretation", SHORT),
    def(263, "Threshholding", SHORT),
    def(266, "FillOrder", SHORT),
    def(269, "DocumentName", ASCII),
    def(270, "ImageDescription", ASCII),
    def(MAKE, "Make", ASCII),
    def(MODEL, "Model", ASCII),
    def(STRIP_OFFSETS, "StripOffsets", SHORT_OR_LONG),
    def(ORIENTATION, "Orientation", SHORT),
    def(SAMPLES_PER_PIXEL, "SamplesPerPixel", SHORT),
    def(ROWS_PER_STRIP, "RowsPerStrip", SHORT_OR_LONG),
    def(STRIP_BYTE_COUNTS, "StripByteCounts", SHORT_OR_LONG),
    def(X_RESOLUTION, "XResolution", RATIONAL),
    def(Y_RESOLUTION, "YResolution", RATIONAL),
    def(284, "PlanarConfiguration", SHORT),
    def(285, "PageName", ASCII),
    def(RESOLUTION_UNIT, "ResolutionUnit", SHORT),
    def(297, "PageNumber", SHORT),
    def(305, "Software", ASCII),
    def(DATE_TIME, "DateTime", ASCII),
    def(315, "Artist", ASCII),
    def(316, "HostComputer", ASCII),
    def(317, "Predictor", SHORT),
    def(COLOR_MAP, "ColorMap", SHORT),
    def(TILE_WIDTH, "TileWidth", SHORT_OR_LONG),
    def(TILE_LENGTH, "TileLength", SHORT_OR_LONG),
    def(TILE_OFFSETS, "TileOffsets", LONG),
    def(TILE_BYTE_COUNTS, "TileByteCounts", SHORT_OR_LONG),
    def(SUB_IFDS, "SubIFDs", POINTER),
    def(338, "ExtraSamples", SHORT),
    def(339, "SampleFormat", SHORT),
    def(JPEG_INTERCHANGE_FORMAT, "JPEGInterchangeFormat", LONG),
    def(514, "JPEGInterchangeFormatLength", LONG),
    def(530, "YCbCrSubSampling", SHORT),
    def(531, "YCbCrPositioning", SHORT),
    def(33432, "Copyright", ASCII),
    def(33434, "ExposureTime", RATIONAL),
    def(33437, "FNumber", RATIONAL),
    def(EXIF_IFD, "ExifIFD", POINTER),
    def(34850, "ExposureProgram", SHORT),
    def(GPS_IFD, "GPSInfo", POINTER),
    def(34855, "ISOSpeedRatings", SHORT),
    def(36864, "ExifVersion", UNDEFINED),
    def(36867, "DateTimeOriginal", ASCII),
    def(36868, "DateTimeDigitized", ASCII),
    def(37377, "ShutterSpeedValue", SRATIONAL),
    def(37378, "ApertureValue", RATIONAL),
    def(37380, "ExposureBiasValue", SRATIONAL),
    def(37385, "Flash", SHORT),
    def(37386, "FocalLength", RATIONAL),
    def(TIFF_EP_STANDARD_ID, "TIFF/EPStandardID", BYTE),
    def(37500, "MakerNote", UNDEFINED),
    def(40960, "FlashpixVersion", UNDEFINED),
    def(40961, "ColorSpace", SHORT),
    def(40962, "PixelXDimension", SHORT_OR_LONG),
    def(40963, "PixelYDimension", SHORT_OR_LONG),
    def(INTEROPERABILITY_IFD, "InteroperabilityIFD", POINTER),
    def(DNG_VERSION, "DNGVersion", BYTE),
    def(50707, "DNGBackwardVersion", BYTE),
    def(50708, "UniqueCameraModel", ASCII),
];

/// GPS IFD tags (their own numbering space).
pub const GPS_TAGS: &[TagDef] = &[
    def(0, "GPSVersionID", BYTE),
    def(1, "GPSLatitudeRef", ASCII),
    def(2, "GPSLatitude", RATIONAL),
    def(3, "GPSLongitudeRef", ASCII),
    def(4, "GPSLongitude", RATIONAL),
    def(5, "GPSAltitudeRef", BYTE),
    def(6, "GPSAltitude", RATIONAL),
    def(7, "GPSTimeStamp", RATIONAL),
    def(18, "GPSMapDatum", ASCII),
    def(29, "GPSDateStamp", ASCII),
];

/// Interoperability IFD tags.
pub const INTEROP_TAGS: &[TagDef] = &[
    def(1, "InteroperabilityIndex", ASCII),
    def(2, "InteroperabilityVersion", UNDEFINED),
];

pub fn lookup(table: &'static [TagDef], tag: u16) -> Option<&'static TagDef> {
    table.iter().find(|d| d.tag == tag)
}

pub fn compression_name(value: u32) -> String {
    match value {
        1 => "Uncompressed".to_string(),
        2 => "CCITT 1D".to_string(),
        3 => "CCITT Group 3".to_string(),
        4 => "CCITT Group 4".to_string(),
        5 => "LZW".to_string(),
        6 => "JPEG (old-style)".to_string(),
        7 => "JPEG".to_string(),
        8 | 32946 => "Deflate".to_string(),
        32773 => "PackBits".to_string(),
        other => format!("Compression {}", other),
    }
}

pub fn photometric_name(value: u32) -> String {
    match value {
        0 => "WhiteIsZero".to_string(),
        1 => "BlackIsZero".to_string(),
        2 => "RGB".to_string(),
        3 => "RGB Palette".to_string(),
        4 => "Transparency Mask".to_string(),
        5 => "CMYK".to_string(),
        6 => "YCbCr".to_string(),
        8 => "CIELab".to_string(),
        32803 => "Color Filter Array".to_string(),
        34892 => "Linear Raw".to_string(),
        other => format!("Photometric {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted_and_unique() {
        for table in [TIFF_TAGS, GPS_TAGS, INTEROP_TAGS] {
            assert!(table.windows(2).all(|w| w[0].tag < w[1].tag));
            assert!(table.iter().all(|d| !d.types.is_empty()));
        }
    }

    #[test]
    fn namespaces_are_separate() {
        assert_eq!(lookup(GPS_TAGS, 2).map(|d| d.name), Some("GPSLatitude"));
        assert!(lookup(TIFF_TAGS, 2).is_none());
        assert_eq!(lookup(TIFF_TAGS, EXIF_IFD).map(|d| d.types), Some(POINTER));
    }
}
