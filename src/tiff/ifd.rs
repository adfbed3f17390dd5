//! Slice-based TIFF structure reader.
//!
//! Everything here works on a buffered byte slice and returns `Option`; callers decide
//! whether a `None` is structural. Nothing in this module panics on hostile offsets.

use crate::cursor::Endian;
use crate::metadata::{ImageMetadata, Rank, Resolution};
use crate::property::Property;
use crate::text::nul_terminated;
use crate::tiff::tags;

/// TIFF magic number.
pub const TIFF_MAGIC: u16 = 42;
/// BigTIFF magic number; recognised only to give a clearer diagnostic.
pub const BIGTIFF_MAGIC: u16 = 43;
/// Size of the TIFF header in bytes.
pub const TIFF_HEADER_LEN: usize = 8;
/// Size of one IFD entry in bytes.
pub const IFD_ENTRY_LEN: usize = 12;

pub const TYPE_BYTE: u16 = 1;
pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_RATIONAL: u16 = 5;
pub const TYPE_SBYTE: u16 = 6;
pub const TYPE_UNDEFINED: u16 = 7;
pub const TYPE_SSHORT: u16 = 8;
pub const TYPE_SLONG: u16 = 9;
pub const TYPE_SRATIONAL: u16 = 10;
pub const TYPE_FLOAT: u16 = 11;
pub const TYPE_DOUBLE: u16 = 12;
pub const TYPE_IFD: u16 = 13;

/// Size in bytes of one value of a field type; `None` for types classic TIFF does not define.
#[inline]
pub fn type_size(field_type: u16) -> Option<u64> {
    match field_type {
        TYPE_BYTE | TYPE_ASCII | TYPE_SBYTE | TYPE_UNDEFINED => Some(1),
        TYPE_SHORT | TYPE_SSHORT => Some(2),
        TYPE_LONG | TYPE_SLONG | TYPE_FLOAT | TYPE_IFD => Some(4),
        TYPE_RATIONAL | TYPE_SRATIONAL | TYPE_DOUBLE => Some(8),
        _ => None,
    }
}

/// Byte-order mark and IFD0 offset from the 8-byte header.
pub fn read_tiff_header(data: &[u8]) -> Option<(Endian, u32)> {
    let endian = match data.get(..2)? {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => return None,
    };
    if endian.u16_at(data, 2)? != TIFF_MAGIC {
        return None;
    }
    Some((endian, endian.u32_at(data, 4)?))
}

/// Single IFD entry (tag, type, count, value/offset) and where it sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub value_offset: u32,
    /// Offset of the entry itself.
    pub at: usize,
}

impl IfdEntry {
    /// Total value size, when the field type is known.
    pub fn byte_len(&self) -> Option<u64> {
        type_size(self.field_type).map(|s| s * u64::from(self.count))
    }

    /// Values of four bytes or fewer live in the entry itself.
    pub fn is_inline(&self) -> bool {
        self.byte_len().is_some_and(|n| n <= 4)
    }

    /// The value bytes, inline or at the value offset.
    pub fn value_bytes<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let len = usize::try_from(self.byte_len()?).ok()?;
        let start = if len <= 4 {
            self.at.checked_add(8)?
        } else {
            usize::try_from(self.value_offset).ok()?
        };
        data.get(start..start.checked_add(len)?)
    }
}

/// Read one IFD entry at `at` (12 bytes must be available).
pub fn read_ifd_entry(endian: Endian, data: &[u8], at: usize) -> Option<IfdEntry> {
    if data.len().saturating_sub(at) < IFD_ENTRY_LEN {
        return None;
    }
    Some(IfdEntry {
        tag: endian.u16_at(data, at)?,
        field_type: endian.u16_at(data, at + 2)?,
        count: endian.u32_at(data, at + 4)?,
        value_offset: endian.u32_at(data, at + 8)?,
        at,
    })
}

/// Entry count and next-IFD offset of the directory at `offset`.
///
/// `None` when the entry table or the next pointer does not fit in `data`.
pub fn read_ifd_header(endian: Endian, data: &[u8], offset: usize) -> Option<(u16, u32)> {
    let count = endian.u16_at(data, offset)?;
    let end = offset
        .checked_add(2)?
        .checked_add(usize::from(count) * IFD_ENTRY_LEN)?;
    let next = endian.u32_at(data, end)?;
    Some((count, next))
}

/// Unsigned values of a BYTE, UNDEFINED, SHORT, LONG or IFD entry.
pub fn entry_uints(endian: Endian, data: &[u8], entry: &IfdEntry) -> Option<Vec<u32>> {
    let bytes = entry.value_bytes(data)?;
    match entry.field_type {
        TYPE_BYTE | TYPE_UNDEFINED => Some(bytes.iter().map(|&b| u32::from(b)).collect()),
        TYPE_SHORT => (0..bytes.len() / 2)
            .map(|i| endian.u16_at(bytes, i * 2).map(u32::from))
            .collect(),
        TYPE_LONG | TYPE_IFD => (0..bytes.len() / 4)
            .map(|i| endian.u32_at(bytes, i * 4))
            .collect(),
        _ => None,
    }
}

/// First unsigned value of an integer entry.
pub fn entry_uint(endian: Endian, data: &[u8], entry: &IfdEntry) -> Option<u32> {
    entry_uints(endian, data, entry)?.first().copied()
}

/// Values of a RATIONAL entry.
pub fn entry_rationals(endian: Endian, data: &[u8], entry: &IfdEntry) -> Option<Vec<Resolution>> {
    if entry.field_type != TYPE_RATIONAL {
        return None;
    }
    let bytes = entry.value_bytes(data)?;
    (0..bytes.len() / 8)
        .map(|i| {
            Some(Resolution {
                numerator: endian.u32_at(bytes, i * 8)?,
                denominator: endian.u32_at(bytes, i * 8 + 4)?,
            })
        })
        .collect()
}

/// Text of an ASCII entry, up to the first NUL.
pub fn entry_ascii(data: &[u8], entry: &IfdEntry) -> Option<String> {
    if entry.field_type != TYPE_ASCII {
        return None;
    }
    entry.value_bytes(data).map(nul_terminated)
}

pub fn resolution_unit_name(unit: u16) -> &'static str {
    match unit {
        1 => "none",
        2 => "inch",
        3 => "centimeter",
        _ => "unknown",
    }
}

/// The handful of IFD0 fields other containers (JPEG APP1, PNG eXIf) care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ifd0Summary {
    pub byte_order: &'static str,
    pub entries: u16,
    pub make: Option<String>,
    pub model: Option<String>,
    pub date_time: Option<String>,
    pub orientation: Option<u16>,
    pub x_resolution: Option<Resolution>,
    pub y_resolution: Option<Resolution>,
    pub resolution_unit: Option<u16>,
}

impl Ifd0Summary {
    /// Offer the resolution fields to `image` at `rank`.
    pub fn apply(&self, image: &mut ImageMetadata, rank: Rank) {
        let (Some(x), Some(y)) = (self.x_resolution, self.y_resolution) else {
            return;
        };
        image.x_resolution.offer(x, rank);
        image.y_resolution.offer(y, rank);
        image
            .resolution_unit
            .offer(resolution_unit_name(self.resolution_unit.unwrap_or(2)).to_string(), rank);
    }

    /// `Exif` group with the populated fields.
    pub fn to_property(&self) -> Property {
        let mut props = vec![
            Property::scalar("ByteOrder", self.byte_order),
            Property::scalar("Entries", self.entries),
        ];
        if let Some(v) = &self.make {
            props.push(Property::scalar("Make", v.as_str()));
        }
        if let Some(v) = &self.model {
            props.push(Property::scalar("Model", v.as_str()));
        }
        if let Some(v) = &self.date_time {
            props.push(Property::scalar("DateTime", v.as_str()));
        }
        if let Some(v) = self.orientation {
            props.push(Property::scalar("Orientation", v));
        }
        if let Some(r) = self.x_resolution {
            props.push(Property::rational("XResolution", r.numerator, r.denominator));
        }
        if let Some(r) = self.y_resolution {
            props.push(Property::rational("YResolution", r.numerator, r.denominator));
        }
        if let Some(u) = self.resolution_unit {
            props.push(Property::scalar("ResolutionUnit", resolution_unit_name(u)));
        }
        Property::nested("Exif", props)
    }
}

/// Summarise IFD0 of an embedded TIFF structure (the body of an Exif block).
///
/// Returns `None` when the header or the IFD0 entry table is unreadable. Entries with
/// out-of-range values are skipped rather than failing the summary.
pub fn read_ifd0_summary(data: &[u8]) -> Option<Ifd0Summary> {
    let (endian, ifd0) = read_tiff_header(data)?;
    let ifd0 = usize::try_from(ifd0).ok()?;
    let count = endian.u16_at(data, ifd0)?;
    let mut summary = Ifd0Summary {
        byte_order: match endian {
            Endian::Little => "II",
            Endian::Big => "MM",
        },
        entries: count,
        ..Ifd0Summary::default()
    };
    for i in 0..usize::from(count) {
        let entry = read_ifd_entry(endian, data, ifd0 + 2 + i * IFD_ENTRY_LEN)?;
        match entry.tag {
            tags::MAKE => summary.make = entry_ascii(data, &entry),
            tags::MODEL => summary.model = entry_ascii(data, &entry),
            tags::DATE_TIME => summary.date_time = entry_ascii(data, &entry),
            tags::ORIENTATION => {
                summary.orientation = entry_uint(endian, data, &entry).map(|v| v as u16)
            }
            tags::RESOLUTION_UNIT => {
                summary.resolution_unit = entry_uint(endian, data, &entry).map(|v| v as u16)
            }
            tags::X_RESOLUTION => {
                summary.x_resolution =
                    entry_rationals(endian, data, &entry).and_then(|v| v.first().copied())
            }
            tags::Y_RESOLUTION => {
                summary.y_resolution =
                    entry_rationals(endian, data, &entry).and_then(|v| v.first().copied())
            }
            _ => {}
        }
    }
    Some(summary)
}
