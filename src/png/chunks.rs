//! PNG chunk types: the static per-tag table and the handler variant set.
//! See https://www.w3.org/TR/png-3/#5Chunk-layout

use crate::unit::{fourcc, fourcc_name, Category, Dispatcher, Tag, UnitSpec};

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest chunk length the format allows (2^31 - 1).
pub const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

pub const IHDR: Tag = fourcc(b"IHDR");
pub const PLTE: Tag = fourcc(b"PLTE");
pub const IDAT: Tag = fourcc(b"IDAT");
pub const IEND: Tag = fourcc(b"IEND");
pub const CHRM: Tag = fourcc(b"cHRM");
pub const GAMA: Tag = fourcc(b"gAMA");
pub const ICCP: Tag = fourcc(b"iCCP");
pub const SBIT: Tag = fourcc(b"sBIT");
pub const SRGB: Tag = fourcc(b"sRGB");
pub const TEXT: Tag = fourcc(b"tEXt");
pub const ZTXT: Tag = fourcc(b"zTXt");
pub const ITXT: Tag = fourcc(b"iTXt");
pub const BKGD: Tag = fourcc(b"bKGD");
pub const HIST: Tag = fourcc(b"hIST");
pub const TRNS: Tag = fourcc(b"tRNS");
pub const PHYS: Tag = fourcc(b"pHYs");
pub const SPLT: Tag = fourcc(b"sPLT");
pub const TIME: Tag = fourcc(b"tIME");
pub const EXIF: Tag = fourcc(b"eXIf");
pub const ACTL: Tag = fourcc(b"acTL");
pub const FCTL: Tag = fourcc(b"fcTL");
pub const FDAT: Tag = fourcc(b"fdAT");

use Category::{Ancillary, Critical};

/// Static chunk table: category, duplicate rule and minimum payload.
pub const CHUNK_TABLE: &[UnitSpec] = &[
    UnitSpec::new(IHDR, "IHDR", Critical, false, 13),
    UnitSpec::new(PLTE, "PLTE", Critical, false, 0),
    UnitSpec::new(IDAT, "IDAT", Critical, true, 0),
    UnitSpec::new(IEND, "IEND", Critical, false, 0),
    UnitSpec::new(CHRM, "cHRM", Ancillary, false, 32),
    UnitSpec::new(GAMA, "gAMA", Ancillary, false, 4),
    UnitSpec::new(ICCP, "iCCP", Ancillary, false, 3),
    UnitSpec::new(SBIT, "sBIT", Ancillary, false, 1),
    UnitSpec::new(SRGB, "sRGB", Ancillary, false, 1),
    UnitSpec::new(TEXT, "tEXt", Ancillary, true, 1),
    UnitSpec::new(ZTXT, "zTXt", Ancillary, true, 3),
    UnitSpec::new(ITXT, "iTXt", Ancillary, true, 5),
    UnitSpec::new(BKGD, "bKGD", Ancillary, false, 1),
    UnitSpec::new(HIST, "hIST", Ancillary, false, 2),
    UnitSpec::new(TRNS, "tRNS", Ancillary, false, 0),
    UnitSpec::new(PHYS, "pHYs", Ancillary, false, 9),
    UnitSpec::new(SPLT, "sPLT", Ancillary, true, 3),
    UnitSpec::new(TIME, "tIME", Ancillary, false, 7),
    UnitSpec::new(EXIF, "eXIf", Ancillary, false, 4),
    UnitSpec::new(ACTL, "acTL", Ancillary, false, 8),
    UnitSpec::new(FCTL, "fcTL", Ancillary, true, 26),
    UnitSpec::new(FDAT, "fdAT", Ancillary, true, 4),
];

/// Bit 5 of the first type byte: 0 = critical, 1 = ancillary.
pub fn category_of(tag: Tag) -> Category {
    if tag.to_be_bytes()[0] & 0x20 == 0 {
        Critical
    } else {
        Ancillary
    }
}

/// Bit 5 of the third type byte is reserved and must be 0 (uppercase).
pub fn reserved_bit_set(tag: Tag) -> bool {
    tag.to_be_bytes()[2] & 0x20 != 0
}

/// Chunk type bytes must be ASCII letters.
pub fn is_valid_type(bytes: &[u8; 4]) -> bool {
    bytes.iter().all(u8::is_ascii_alphabetic)
}

pub const DISPATCH: Dispatcher = Dispatcher::new(CHUNK_TABLE, category_of, fourcc_name);

/// Handler variant for a chunk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Ihdr,
    Plte,
    Idat,
    Iend,
    Chrm,
    Gama,
    Iccp,
    Sbit,
    Srgb,
    Text,
    Ztxt,
    Itxt,
    Bkgd,
    Hist,
    Trns,
    Phys,
    Splt,
    Time,
    Exif,
    Actl,
    Fctl,
    Fdat,
    Unknown,
}

impl ChunkKind {
    pub fn from_tag(tag: Tag) -> Self {
        match tag {
            IHDR => ChunkKind::Ihdr,
            PLTE => ChunkKind::Plte,
            IDAT => ChunkKind::Idat,
            IEND => ChunkKind::Iend,
            CHRM => ChunkKind::Chrm,
            GAMA => ChunkKind::Gama,
            ICCP => ChunkKind::Iccp,
            SBIT => ChunkKind::Sbit,
            SRGB => ChunkKind::Srgb,
            TEXT => ChunkKind::Text,
            ZTXT => ChunkKind::Ztxt,
            ITXT => ChunkKind::Itxt,
            BKGD => ChunkKind::Bkgd,
            HIST => ChunkKind::Hist,
            TRNS => ChunkKind::Trns,
            PHYS => ChunkKind::Phys,
            SPLT => ChunkKind::Splt,
            TIME => ChunkKind::Time,
            EXIF => ChunkKind::Exif,
            ACTL => ChunkKind::Actl,
            FCTL => ChunkKind::Fctl,
            FDAT => ChunkKind::Fdat,
            _ => ChunkKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_has_a_handler() {
        for spec in CHUNK_TABLE {
            assert_ne!(ChunkKind::from_tag(spec.tag), ChunkKind::Unknown, "{}", spec.name);
            assert_eq!(category_of(spec.tag), spec.category, "{}", spec.name);
        }
    }

    #[test]
    fn type_byte_conventions() {
        assert_eq!(category_of(fourcc(b"vpAg")), Category::Ancillary);
        assert_eq!(category_of(fourcc(b"XXXX")), Category::Critical);
        assert!(reserved_bit_set(fourcc(b"abcd")));
        assert!(!reserved_bit_set(fourcc(b"abCd")));
        assert!(!is_valid_type(b"IH1R"));
    }
}
