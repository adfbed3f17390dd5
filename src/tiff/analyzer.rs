//! TIFF grammar: each image file directory is one unit, its entries are checked against
//! the tag table, and pointer tags queue further directories.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Read;

use log::{debug, trace};

use crate::cursor::{ChecksummingCursor, Endian};
use crate::driver::{self, Grammar};
use crate::error::StructuralFault;
use crate::metadata::{ImageMetadata, Rank};
use crate::options::ParseOptions;
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::tiff::ifd::{
    entry_ascii, entry_rationals, entry_uint, entry_uints, read_ifd_entry, read_ifd_header,
    read_tiff_header, resolution_unit_name, type_size, IfdEntry, BIGTIFF_MAGIC, IFD_ENTRY_LEN,
    TIFF_HEADER_LEN, TYPE_ASCII, TYPE_RATIONAL,
};
use crate::tiff::tags::{self, lookup, TagDef, GPS_TAGS, INTEROP_TAGS, TIFF_TAGS};
use crate::unit::{SeenUnits, UnitOutcome, UnitResult};

pub const BIGTIFF_ID: &str = "TIFF-BIGTIFF";
pub const IFD_OFFSET_ID: &str = "TIFF-IFD-OFFSET";
pub const IFD_CYCLE_ID: &str = "TIFF-IFD-CYCLE";
pub const IFD_EMPTY_ID: &str = "TIFF-IFD-EMPTY";
pub const VALUE_OFFSET_ID: &str = "TIFF-VALUE-OFFSET";
pub const WORD_ALIGN_ID: &str = "TIFF-WORD-ALIGN";
pub const TAG_ORDER_ID: &str = "TIFF-TAG-ORDER";
pub const DUPLICATE_TAG_ID: &str = "TIFF-DUPLICATE-TAG";
pub const TAG_TYPE_ID: &str = "TIFF-TAG-TYPE";
pub const UNKNOWN_TYPE_ID: &str = "TIFF-UNKNOWN-TYPE";
pub const MISSING_TAG_ID: &str = "TIFF-MISSING-TAG";
pub const STRIP_COUNT_ID: &str = "TIFF-STRIP-COUNT";
pub const STRIP_BOUNDS_ID: &str = "TIFF-STRIP-BOUNDS";
pub const CHAIN_IGNORED_ID: &str = "TIFF-CHAIN-IGNORED";

/// Largest array rendered element by element in the property tree.
const MAX_RENDERED_VALUES: usize = 16;

/// Which kind of directory an offset points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdKind {
    /// Member of the main IFD chain, by position.
    Main(usize),
    Sub,
    Exif,
    Gps,
    Interop,
}

impl IfdKind {
    fn name(self) -> String {
        match self {
            IfdKind::Main(n) => format!("IFD{}", n),
            IfdKind::Sub => "SubIFD".to_string(),
            IfdKind::Exif => "Exif".to_string(),
            IfdKind::Gps => "GPS".to_string(),
            IfdKind::Interop => "Interoperability".to_string(),
        }
    }

    fn table(self) -> &'static [TagDef] {
        match self {
            IfdKind::Gps => GPS_TAGS,
            IfdKind::Interop => INTEROP_TAGS,
            _ => TIFF_TAGS,
        }
    }

    fn is_image(self) -> bool {
        matches!(self, IfdKind::Main(_) | IfdKind::Sub)
    }
}

/// Per-parse TIFF state. The whole stream is buffered so offsets can be followed.
#[derive(Debug)]
pub struct TiffState {
    data: Vec<u8>,
    endian: Endian,
    pending: VecDeque<(u32, IfdKind)>,
    visited: BTreeSet<u32>,
    ifds: usize,
    max_ifds: usize,
    image: ImageMetadata,
    profiles: Vec<&'static str>,
    groups: Vec<Vec<Property>>,
}

/// Grammar for classic (32-bit offset) TIFF, including DNG and TIFF/EP files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffGrammar;

impl Grammar for TiffGrammar {
    type State = TiffState;
    const FORMAT: &'static str = "TIFF";

    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<TiffState, StructuralFault> {
        let head = cursor.read_array::<TIFF_HEADER_LEN>()?;
        let Some((endian, ifd0)) = read_tiff_header(&head) else {
            let big = match &head[..2] {
                b"II" => Endian::Little.u16_at(&head, 2),
                b"MM" => Endian::Big.u16_at(&head, 2),
                _ => None,
            };
            if big == Some(BIGTIFF_MAGIC) {
                return Err(StructuralFault::malformed(BIGTIFF_ID, 2, "BigTIFF is not supported"));
            }
            return Err(StructuralFault::BadSignature {
                format: "TIFF",
                offset: 0,
            });
        };
        info.mime_type = Some("image/tiff".to_string());
        info.version = Some("6.0".to_string());

        let mut data = head.to_vec();
        data.extend(cursor.read_to_end(options.max_buffered)?);
        debug!("TIFF: buffered {} bytes, IFD0 at {}", data.len(), ifd0);

        check_ifd_pointer(ifd0, data.len(), 4, info)?;
        let mut pending = VecDeque::new();
        pending.push_back((ifd0, IfdKind::Main(0)));
        Ok(TiffState {
            data,
            endian,
            pending,
            visited: BTreeSet::new(),
            ifds: 0,
            max_ifds: options.max_ifds,
            image: ImageMetadata::default(),
            profiles: Vec::new(),
            groups: Vec::new(),
        })
    }

    fn next_unit<R: Read>(
        &self,
        _cursor: &mut ChecksummingCursor<R>,
        state: &mut TiffState,
        info: &mut RepInfo,
    ) -> UnitResult {
        let Some((offset, kind)) = state.pending.pop_front() else {
            return Ok(UnitOutcome::Terminal);
        };
        if !state.visited.insert(offset) {
            return Err(StructuralFault::malformed(
                IFD_CYCLE_ID,
                u64::from(offset),
                format!("{} at offset {} was already read", kind.name(), offset),
            ));
        }
        state.ifds += 1;
        if state.ifds > state.max_ifds {
            return Err(StructuralFault::IterationLimit {
                what: "IFDs",
                limit: state.max_ifds,
                offset: u64::from(offset),
            });
        }
        read_ifd(state, offset, kind, info)?;
        Ok(UnitOutcome::Continue)
    }

    fn finish(&self, state: TiffState, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
        if completed {
            for p in &state.profiles {
                info.add_profile(*p);
            }
        }
        let byte_order = match state.endian {
            Endian::Little => "little-endian",
            Endian::Big => "big-endian",
        };
        let mut tiff = vec![
            Property::scalar("ByteOrder", byte_order),
            Property::scalar("IFDCount", state.groups.len() as u64),
        ];
        if !state.groups.is_empty() {
            tiff.push(Property::group_list("IFDs", state.groups));
        }
        info.properties.push(Property::nested("TIFFMetadata", tiff));
        if let Some(image) = state.image.to_property() {
            info.properties.push(image);
        }
        Ok(())
    }
}

/// A directory pointer must land past the header (structural) on a word boundary (policy).
/// One that lands past the buffered bytes means the stream was cut short.
fn check_ifd_pointer(target: u32, len: usize, from: u64, info: &mut RepInfo) -> Result<(), StructuralFault> {
    if (target as usize) < TIFF_HEADER_LEN {
        return Err(StructuralFault::malformed(
            IFD_OFFSET_ID,
            from,
            format!("IFD offset {} points into the header", target),
        ));
    }
    if target as usize >= len {
        return Err(StructuralFault::TruncatedStream { offset: len as u64 });
    }
    if target % 2 != 0 {
        info.policy_with(WORD_ALIGN_ID, "IFD offset is not word aligned", target.to_string(), from);
    }
    Ok(())
}

fn read_ifd(state: &mut TiffState, offset: u32, kind: IfdKind, info: &mut RepInfo) -> Result<(), StructuralFault> {
    let endian = state.endian;
    let at = offset as usize;
    let Some((count, next)) = read_ifd_header(endian, &state.data, at) else {
        return Err(StructuralFault::TruncatedStream {
            offset: state.data.len() as u64,
        });
    };
    trace!("TIFF {} at {}: {} entries", kind.name(), offset, count);
    if count == 0 {
        info.policy(IFD_EMPTY_ID, format!("{} has no entries", kind.name()), u64::from(offset));
    }

    let table = kind.table();
    let mut seen = SeenUnits::default();
    let mut previous: Option<u16> = None;
    let mut entries: BTreeMap<u16, IfdEntry> = BTreeMap::new();
    let mut props = vec![
        Property::scalar("Offset", offset),
        Property::scalar("Kind", kind.name()),
    ];

    for i in 0..usize::from(count) {
        let entry_at = at + 2 + i * IFD_ENTRY_LEN;
        let Some(entry) = read_ifd_entry(endian, &state.data, entry_at) else {
            return Err(StructuralFault::TruncatedStream {
                offset: state.data.len() as u64,
            });
        };
        let pos = entry_at as u64;

        if let Some(first) = seen.note(u32::from(entry.tag), pos) {
            info.policy_with(
                DUPLICATE_TAG_ID,
                format!("tag {} repeated in {}", entry.tag, kind.name()),
                format!("first at offset {}", first),
                pos,
            );
            continue;
        }
        if previous.is_some_and(|p| entry.tag < p) {
            info.policy(TAG_ORDER_ID, format!("tags in {} are not in ascending order", kind.name()), pos);
        }
        previous = Some(entry.tag);

        let Some(byte_len) = entry.byte_len() else {
            info.info(
                UNKNOWN_TYPE_ID,
                format!("tag {} has unknown field type {}", entry.tag, entry.field_type),
                Some(pos),
            );
            continue;
        };
        if byte_len > 4 {
            if (entry.value_offset as usize) < TIFF_HEADER_LEN {
                return Err(StructuralFault::malformed(
                    VALUE_OFFSET_ID,
                    pos,
                    format!("tag {} value offset {} points into the header", entry.tag, entry.value_offset),
                ));
            }
            let end = u64::from(entry.value_offset) + byte_len;
            if end > state.data.len() as u64 {
                return Err(StructuralFault::TruncatedStream {
                    offset: state.data.len() as u64,
                });
            }
            if entry.value_offset % 2 != 0 {
                info.policy_with(
                    WORD_ALIGN_ID,
                    format!("tag {} value offset is not word aligned", entry.tag),
                    entry.value_offset.to_string(),
                    pos,
                );
            }
        }

        if let Some(def) = lookup(table, entry.tag) {
            if def.types.contains(&entry.field_type) {
                if let Some(p) = entry_property(def.name, endian, &state.data, &entry) {
                    props.push(p);
                }
            } else {
                info.policy_with(
                    TAG_TYPE_ID,
                    format!("{} has an unexpected field type", def.name),
                    format!("type {}", entry.field_type),
                    pos,
                );
                continue;
            }
        }
        entries.insert(entry.tag, entry);
        queue_pointers(state, kind, &entry, info)?;
    }

    if next != 0 {
        let next_at = (at + 2 + usize::from(count) * IFD_ENTRY_LEN) as u64;
        match kind {
            IfdKind::Main(n) => {
                check_ifd_pointer(next, state.data.len(), next_at, info)?;
                state.pending.push_back((next, IfdKind::Main(n + 1)));
            }
            IfdKind::Sub => {
                check_ifd_pointer(next, state.data.len(), next_at, info)?;
                state.pending.push_back((next, IfdKind::Sub));
            }
            _ => info.info(
                CHAIN_IGNORED_ID,
                format!("next-IFD pointer of the {} IFD ignored", kind.name()),
                Some(next_at),
            ),
        }
    }

    if kind.is_image() {
        check_image_ifd(state, &entries, kind, offset, info);
    }
    if kind == IfdKind::Main(0) {
        record_ifd0(state, &entries);
    }
    state.groups.push(props);
    Ok(())
}

fn queue_pointers(state: &mut TiffState, kind: IfdKind, entry: &IfdEntry, info: &mut RepInfo) -> Result<(), StructuralFault> {
    let target = match (kind, entry.tag) {
        (IfdKind::Gps | IfdKind::Interop, _) => return Ok(()),
        (_, tags::SUB_IFDS) => IfdKind::Sub,
        (IfdKind::Exif, tags::INTEROPERABILITY_IFD) => IfdKind::Interop,
        (IfdKind::Exif, _) => return Ok(()),
        (_, tags::EXIF_IFD) => IfdKind::Exif,
        (_, tags::GPS_IFD) => IfdKind::Gps,
        _ => return Ok(()),
    };
    let offsets = entry_uints(state.endian, &state.data, entry).unwrap_or_default();
    for off in offsets {
        check_ifd_pointer(off, state.data.len(), entry.at as u64, info)?;
        state.pending.push_back((off, target));
    }
    Ok(())
}

fn entry_property(name: &str, endian: Endian, data: &[u8], entry: &IfdEntry) -> Option<Property> {
    if entry.field_type == TYPE_ASCII {
        return entry_ascii(data, entry).map(|s| Property::scalar(name, s));
    }
    if entry.field_type == TYPE_RATIONAL {
        let values = entry_rationals(endian, data, entry)?;
        return match values.as_slice() {
            [r] => Some(Property::rational(name, r.numerator, r.denominator)),
            many if many.len() <= MAX_RENDERED_VALUES => Some(Property::array(
                name,
                many.iter()
                    .map(|r| Value::Rational {
                        numerator: r.numerator,
                        denominator: r.denominator,
                    })
                    .collect(),
            )),
            many => Some(Property::scalar(name, format!("{} values", many.len()))),
        };
    }
    match entry_uints(endian, data, entry) {
        Some(values) => match values.as_slice() {
            [v] => Some(Property::scalar(name, *v)),
            many if many.len() <= MAX_RENDERED_VALUES => {
                Some(Property::array(name, many.iter().map(|&v| Value::from(v)).collect()))
            }
            many => Some(Property::scalar(name, format!("{} values", many.len()))),
        },
        None => Some(Property::scalar(
            name,
            format!("{} x {} bytes", entry.count, type_size(entry.field_type)?),
        )),
    }
}

/// Required-field and data-location checks for a directory that describes an image.
fn check_image_ifd(
    state: &TiffState,
    entries: &BTreeMap<u16, IfdEntry>,
    kind: IfdKind,
    offset: u32,
    info: &mut RepInfo,
) {
    let at = u64::from(offset);
    let has = |tag: u16| entries.contains_key(&tag);
    for (tag, name) in [
        (tags::IMAGE_WIDTH, "ImageWidth"),
        (tags::IMAGE_LENGTH, "ImageLength"),
        (tags::PHOTOMETRIC, "PhotometricInterpretation"),
    ] {
        if !has(tag) {
            info.policy(MISSING_TAG_ID, format!("{} lacks {}", kind.name(), name), at);
        }
    }

    let layouts = [
        (tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS, "StripByteCounts"),
        (tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS, "TileByteCounts"),
    ];
    if !layouts.iter().any(|(o, _, _)| has(*o)) && !has(tags::JPEG_INTERCHANGE_FORMAT) {
        info.policy(
            MISSING_TAG_ID,
            format!("{} has neither strips nor tiles", kind.name()),
            at,
        );
    }
    for (offsets_tag, counts_tag, counts_name) in layouts {
        let Some(offsets) = entries.get(&offsets_tag) else {
            continue;
        };
        let Some(counts) = entries.get(&counts_tag) else {
            info.policy(MISSING_TAG_ID, format!("{} lacks {}", kind.name(), counts_name), at);
            continue;
        };
        let (Some(offsets), Some(counts)) = (
            entry_uints(state.endian, &state.data, offsets),
            entry_uints(state.endian, &state.data, counts),
        ) else {
            continue;
        };
        if offsets.len() != counts.len() {
            info.policy_with(
                STRIP_COUNT_ID,
                format!("{} data offsets and byte counts differ in number", kind.name()),
                format!("{} offsets, {} counts", offsets.len(), counts.len()),
                at,
            );
        }
        let len = state.data.len() as u64;
        if offsets
            .iter()
            .zip(&counts)
            .any(|(&o, &c)| u64::from(o) + u64::from(c) > len)
        {
            info.policy(
                STRIP_BOUNDS_ID,
                format!("{} image data runs past the end of the file", kind.name()),
                at,
            );
        }
    }
}

/// Image metadata and profile recognition from the first directory.
fn record_ifd0(state: &mut TiffState, entries: &BTreeMap<u16, IfdEntry>) {
    let endian = state.endian;
    let data = &state.data;
    let uint = |tag: u16| entries.get(&tag).and_then(|e| entry_uint(endian, data, e));
    let uints = |tag: u16| entries.get(&tag).and_then(|e| entry_uints(endian, data, e));
    let rational = |tag: u16| {
        entries
            .get(&tag)
            .and_then(|e| entry_rationals(endian, data, e))
            .and_then(|v| v.first().copied())
    };

    let bits = uints(tags::BITS_PER_SAMPLE).unwrap_or_else(|| vec![1]);
    let samples = uint(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let compression = uint(tags::COMPRESSION).unwrap_or(1);
    let photometric = uint(tags::PHOTOMETRIC);
    let x_res = rational(tags::X_RESOLUTION);
    let y_res = rational(tags::Y_RESOLUTION);
    let unit = uint(tags::RESOLUTION_UNIT).unwrap_or(2);

    let img = &mut state.image;
    if let Some(w) = uint(tags::IMAGE_WIDTH) {
        img.width.offer(w, Rank::Specific);
    }
    if let Some(h) = uint(tags::IMAGE_LENGTH) {
        img.height.offer(h, Rank::Specific);
    }
    let bits_text: Vec<String> = bits.iter().map(u32::to_string).collect();
    img.bits_per_sample.offer(bits_text.join(","), Rank::Specific);
    img.samples_per_pixel.offer(samples as u16, Rank::Specific);
    img.compression.offer(tags::compression_name(compression), Rank::Specific);
    if let Some(p) = photometric {
        img.color_space.offer(tags::photometric_name(p), Rank::Specific);
    }
    if let (Some(x), Some(y)) = (x_res, y_res) {
        img.x_resolution.offer(x, Rank::Specific);
        img.y_resolution.offer(y, Rank::Specific);
        img.resolution_unit
            .offer(resolution_unit_name(unit as u16).to_string(), Rank::Specific);
    }

    let uncompressed_or_packbits = matches!(compression, 1 | 32773);
    let has_resolution = x_res.is_some() && y_res.is_some();
    let baseline = match photometric {
        Some(0 | 1) if bits == [1] && matches!(compression, 1 | 2 | 32773) => Some("Baseline bilevel"),
        Some(0 | 1) if (bits == [4] || bits == [8]) && uncompressed_or_packbits => {
            Some("Baseline grayscale")
        }
        Some(3)
            if (bits == [4] || bits == [8])
                && uncompressed_or_packbits
                && entries.contains_key(&tags::COLOR_MAP) =>
        {
            Some("Baseline palette-color")
        }
        Some(2) if samples >= 3 && bits.iter().take(3).all(|&b| b == 8) && uncompressed_or_packbits => {
            Some("Baseline RGB")
        }
        _ => None,
    };
    if let Some(p) = baseline.filter(|_| has_resolution) {
        state.profiles.push(p);
    }
    if entries.contains_key(&tags::DNG_VERSION) {
        state.profiles.push("DNG");
    }
    if entries.contains_key(&tags::TIFF_EP_STANDARD_ID) {
        state.profiles.push("TIFF/EP");
    }
}

/// Validate a classic TIFF stream.
pub fn validate_tiff<R: Read>(reader: R, options: &ParseOptions) -> RepInfo {
    driver::run(&TiffGrammar, reader, options)
}
