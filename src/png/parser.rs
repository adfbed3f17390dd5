//! PNG chunk handlers and per-parse state.
//!
//! Each handler is entered with the cursor on the first payload byte and may leave
//! payload unread; the analyzer discards the rest and checks the CRC.

use std::io::Read;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::error::StructuralFault;
use crate::metadata::{ImageMetadata, Rank, Resolution};
use crate::png::chunks::{ChunkKind, MAX_CHUNK_LEN, PLTE, SRGB, ICCP};
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::text::{latin1, split_nul};
use crate::tiff::read_ifd0_summary;
use crate::unit::{pass_through, Category, RuleClass, SeenUnits, Unit, UnitOutcome, UnitResult};

const BE: Endian = Endian::Big;

pub const IHDR_FIRST_ID: &str = "PNG-IHDR-FIRST";
pub const IHDR_DIMENSIONS_ID: &str = "PNG-IHDR-DIMENSIONS";
pub const IHDR_COLOR_TYPE_ID: &str = "PNG-IHDR-COLOR-TYPE";
pub const IHDR_BIT_DEPTH_ID: &str = "PNG-IHDR-BIT-DEPTH";
pub const IHDR_METHOD_ID: &str = "PNG-IHDR-METHOD";
pub const IHDR_LENGTH_ID: &str = "PNG-IHDR-LENGTH";
pub const PLTE_AFTER_IDAT_ID: &str = "PNG-PLTE-AFTER-IDAT";
pub const PLTE_LENGTH_ID: &str = "PNG-PLTE-LENGTH";
pub const PLTE_FORBIDDEN_ID: &str = "PNG-PLTE-GRAYSCALE";
pub const PLTE_TOO_LARGE_ID: &str = "PNG-PLTE-TOO-LARGE";
pub const IDAT_NO_PLTE_ID: &str = "PNG-IDAT-NO-PLTE";
pub const IDAT_GAP_ID: &str = "PNG-IDAT-NOT-CONSECUTIVE";
pub const NO_IDAT_ID: &str = "PNG-NO-IDAT";
pub const IEND_LENGTH_ID: &str = "PNG-IEND-LENGTH";
pub const ORDER_ID: &str = "PNG-CHUNK-ORDER";
pub const GAMA_ZERO_ID: &str = "PNG-GAMA-ZERO";
pub const KEYWORD_ID: &str = "PNG-KEYWORD";
pub const COMPRESSION_METHOD_ID: &str = "PNG-COMPRESSION-METHOD";
pub const SRGB_ICCP_ID: &str = "PNG-SRGB-AND-ICCP";
pub const SRGB_INTENT_ID: &str = "PNG-SRGB-INTENT";
pub const SBIT_ID: &str = "PNG-SBIT";
pub const ITXT_ID: &str = "PNG-ITXT";
pub const NEEDS_PLTE_ID: &str = "PNG-NEEDS-PLTE";
pub const BKGD_ID: &str = "PNG-BKGD";
pub const HIST_ID: &str = "PNG-HIST-LENGTH";
pub const TRNS_ID: &str = "PNG-TRNS";
pub const PHYS_UNIT_ID: &str = "PNG-PHYS-UNIT";
pub const SPLT_ID: &str = "PNG-SPLT";
pub const TIME_ID: &str = "PNG-TIME-RANGE";
pub const EXIF_ID: &str = "PNG-EXIF";
pub const APNG_ID: &str = "PNG-APNG";
pub const APNG_SEQUENCE_ID: &str = "PNG-APNG-SEQUENCE";
pub const UNKNOWN_CRITICAL_ID: &str = "PNG-UNKNOWN-CRITICAL";
pub const UNKNOWN_ANCILLARY_ID: &str = "PNG-UNKNOWN-ANCILLARY";

/// Decoded IHDR fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ihdr {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
}

impl Ihdr {
    pub fn samples_per_pixel(&self) -> u16 {
        match self.color_type {
            2 => 3,
            4 => 2,
            6 => 4,
            _ => 1,
        }
    }
}

fn color_type_name(ct: u8) -> &'static str {
    match ct {
        0 => "Greyscale",
        2 => "Truecolour",
        3 => "Indexed-colour",
        4 => "Greyscale with alpha",
        6 => "Truecolour with alpha",
        _ => "Unknown",
    }
}

/// Animated PNG bookkeeping.
#[derive(Debug, Default)]
pub struct ApngState {
    pub num_frames: Option<u32>,
    pub fctl_count: u32,
    pub next_sequence: u32,
    pub broken: bool,
    pub frames: Vec<Vec<Property>>,
}

/// Per-parse PNG state.
#[derive(Debug)]
pub struct PngState {
    pub seen: SeenUnits,
    pub ihdr: Option<Ihdr>,
    pub palette_entries: Option<u32>,
    pub idat_seen: bool,
    /// A non-IDAT chunk followed the IDAT run.
    pub idat_closed: bool,
    pub idat_gap_reported: bool,
    pub idat_bytes: u64,
    pub apng: ApngState,
    pub image: ImageMetadata,
    pub props: Vec<Property>,
    pub texts: Vec<Vec<Property>>,
    pub palettes: Vec<Value>,
    pub max_alloc: u64,
}

impl PngState {
    pub fn new(max_alloc: u64) -> Self {
        Self {
            seen: SeenUnits::default(),
            ihdr: None,
            palette_entries: None,
            idat_seen: false,
            idat_closed: false,
            idat_gap_reported: false,
            idat_bytes: 0,
            apng: ApngState::default(),
            image: ImageMetadata::default(),
            props: Vec::new(),
            texts: Vec::new(),
            palettes: Vec::new(),
            max_alloc,
        }
    }

    fn color_type(&self) -> u8 {
        self.ihdr.map_or(0, |h| h.color_type)
    }
}

/// Run the handler for `kind`. Never reads past the declared payload.
pub fn handle_chunk<R: Read>(
    kind: ChunkKind,
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    match kind {
        ChunkKind::Ihdr => ihdr(unit, cursor, state, info),
        ChunkKind::Plte => plte(unit, cursor, state, info),
        ChunkKind::Idat => idat(unit, cursor, state, info),
        ChunkKind::Iend => iend(unit, state, info),
        ChunkKind::Chrm => chrm(unit, cursor, state, info),
        ChunkKind::Gama => gama(unit, cursor, state, info),
        ChunkKind::Iccp => iccp(unit, cursor, state, info),
        ChunkKind::Sbit => sbit(unit, cursor, state, info),
        ChunkKind::Srgb => srgb(unit, cursor, state, info),
        ChunkKind::Text => text(unit, cursor, state, info),
        ChunkKind::Ztxt => ztxt(unit, cursor, state, info),
        ChunkKind::Itxt => itxt(unit, cursor, state, info),
        ChunkKind::Bkgd => bkgd(unit, cursor, state, info),
        ChunkKind::Hist => hist(unit, state, info),
        ChunkKind::Trns => trns(unit, state, info),
        ChunkKind::Phys => phys(unit, cursor, state, info),
        ChunkKind::Splt => splt(unit, cursor, state, info),
        ChunkKind::Time => time(unit, cursor, state, info),
        ChunkKind::Exif => exif(unit, cursor, state, info),
        ChunkKind::Actl => actl(unit, cursor, state, info),
        ChunkKind::Fctl => fctl(unit, cursor, state, info),
        ChunkKind::Fdat => fdat(unit, cursor, state, info),
        ChunkKind::Unknown => unknown(unit, cursor, info),
    }
}

/// Read at most `max_alloc` payload bytes; the analyzer discards the rest.
fn read_payload<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    max_alloc: u64,
) -> Result<Vec<u8>, StructuralFault> {
    cursor.read_bytes(unit.remaining(cursor).min(max_alloc))
}

/// Ordering rule shared by the colour-space and pre-IDAT ancillary chunks (policy).
fn must_precede(unit: &Unit, state: &PngState, info: &mut RepInfo, plte: bool, idat: bool) {
    if plte && state.seen.contains(PLTE) {
        info.policy(ORDER_ID, format!("{} chunk after PLTE", unit.name), unit.offset);
    }
    if idat && state.idat_seen {
        info.policy(ORDER_ID, format!("{} chunk after IDAT", unit.name), unit.offset);
    }
}

/// Keyword rule for tEXt/zTXt/iTXt/iCCP/sPLT: 1-79 Latin-1 bytes (policy).
fn check_keyword(unit: &Unit, keyword: &[u8], info: &mut RepInfo) {
    if keyword.is_empty() || keyword.len() > 79 {
        info.policy_with(
            KEYWORD_ID,
            format!("{} keyword must be 1-79 bytes", unit.name),
            format!("length {}", keyword.len()),
            unit.offset,
        );
    }
}

fn ihdr<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let width = cursor.read_u32(BE)?;
    let height = cursor.read_u32(BE)?;
    let bit_depth = cursor.read_u8()?;
    let color_type = cursor.read_u8()?;
    let compression = cursor.read_u8()?;
    let filter = cursor.read_u8()?;
    let interlace = cursor.read_u8()?;

    if width == 0 || height == 0 || width > MAX_CHUNK_LEN || height > MAX_CHUNK_LEN {
        return Err(StructuralFault::malformed(
            IHDR_DIMENSIONS_ID,
            unit.offset,
            format!("image dimensions {}x{} out of range", width, height),
        ));
    }
    let depths: &[u8] = match color_type {
        0 => &[1, 2, 4, 8, 16],
        2 | 4 | 6 => &[8, 16],
        3 => &[1, 2, 4, 8],
        _ => {
            return Err(StructuralFault::malformed(
                IHDR_COLOR_TYPE_ID,
                unit.offset,
                format!("invalid colour type {}", color_type),
            ))
        }
    };
    if !depths.contains(&bit_depth) {
        return Err(StructuralFault::malformed(
            IHDR_BIT_DEPTH_ID,
            unit.offset,
            format!("bit depth {} not allowed for colour type {}", bit_depth, color_type),
        ));
    }
    if compression != 0 || filter != 0 || interlace > 1 {
        return Err(StructuralFault::malformed(
            IHDR_METHOD_ID,
            unit.offset,
            format!(
                "unknown method: compression {}, filter {}, interlace {}",
                compression, filter, interlace
            ),
        ));
    }
    if unit.declared_length != 13 {
        info.policy(IHDR_LENGTH_ID, "IHDR length is not 13", unit.offset);
    }

    let header = Ihdr {
        width,
        height,
        bit_depth,
        color_type,
        interlace,
    };
    state.ihdr = Some(header);

    let spp = header.samples_per_pixel();
    let img = &mut state.image;
    img.width.offer(width, Rank::Specific);
    img.height.offer(height, Rank::Specific);
    img.samples_per_pixel.offer(spp, Rank::Specific);
    img.bits_per_sample.offer(
        vec![bit_depth.to_string(); usize::from(spp)].join(","),
        Rank::Specific,
    );
    img.compression.offer("Deflate".to_string(), Rank::Specific);
    let model = match color_type {
        0 | 4 => "Greyscale",
        3 => "Palette",
        _ => "RGB",
    };
    img.color_space.offer(model.to_string(), Rank::Default);

    state.props.push(Property::nested(
        "IHDR",
        vec![
            Property::scalar("Width", width),
            Property::scalar("Height", height),
            Property::scalar("BitDepth", bit_depth),
            Property::scalar("ColorType", color_type_name(color_type)),
            Property::scalar("Interlace", if interlace == 1 { "Adam7" } else { "None" }),
        ],
    ));
    Ok(UnitOutcome::Continue)
}

fn plte<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    if state.idat_seen {
        return Err(StructuralFault::malformed(
            PLTE_AFTER_IDAT_ID,
            unit.offset,
            "PLTE chunk after IDAT",
        ));
    }
    let len = unit.declared_length;
    if len % 3 != 0 || len == 0 || len > 256 * 3 {
        return Err(StructuralFault::malformed(
            PLTE_LENGTH_ID,
            unit.offset,
            format!("PLTE length {} is not 3 x 1..256 entries", len),
        ));
    }
    let entries = (len / 3) as u32;
    match state.ihdr {
        Some(h) if h.color_type == 0 || h.color_type == 4 => {
            info.policy(PLTE_FORBIDDEN_ID, "PLTE chunk in greyscale image", unit.offset);
        }
        Some(h) if h.color_type == 3 && entries > 1u32 << h.bit_depth => {
            info.policy_with(
                PLTE_TOO_LARGE_ID,
                "palette has more entries than the bit depth can index",
                format!("{} entries at bit depth {}", entries, h.bit_depth),
                unit.offset,
            );
        }
        _ => {}
    }
    cursor.skip(len)?;
    state.palette_entries = Some(entries);
    state.props.push(Property::scalar("PaletteEntries", entries));
    Ok(UnitOutcome::Continue)
}

fn idat<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    if !state.idat_seen {
        if state.color_type() == 3 && state.palette_entries.is_none() {
            info.policy(IDAT_NO_PLTE_ID, "indexed-colour image has no PLTE before IDAT", unit.offset);
        }
        state.idat_seen = true;
    } else if state.idat_closed && !state.idat_gap_reported {
        info.policy(IDAT_GAP_ID, "IDAT chunks are not consecutive", unit.offset);
        state.idat_gap_reported = true;
    }
    cursor.skip(unit.declared_length)?;
    state.idat_bytes += unit.declared_length;
    Ok(UnitOutcome::Continue)
}

fn iend(unit: &Unit, state: &mut PngState, info: &mut RepInfo) -> UnitResult {
    if !state.idat_seen {
        return Err(StructuralFault::malformed(
            NO_IDAT_ID,
            unit.offset,
            "IEND reached without any IDAT chunk",
        ));
    }
    if unit.declared_length != 0 {
        info.policy(IEND_LENGTH_ID, "IEND chunk has a non-zero length", unit.offset);
    }
    Ok(UnitOutcome::Terminal)
}

fn chrm<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, true, true);
    let mut v = [0u32; 8];
    for slot in v.iter_mut() {
        *slot = cursor.read_u32(BE)?;
    }
    let pair = |x: u32, y: u32| {
        vec![
            Value::Rational {
                numerator: x,
                denominator: 100_000,
            },
            Value::Rational {
                numerator: y,
                denominator: 100_000,
            },
        ]
    };
    state.props.push(Property::nested(
        "cHRM",
        vec![
            Property::array("WhitePoint", pair(v[0], v[1])),
            Property::array("Red", pair(v[2], v[3])),
            Property::array("Green", pair(v[4], v[5])),
            Property::array("Blue", pair(v[6], v[7])),
        ],
    ));
    Ok(UnitOutcome::Continue)
}

fn gama<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, true, true);
    let gamma = cursor.read_u32(BE)?;
    if gamma == 0 {
        info.policy(GAMA_ZERO_ID, "gAMA value is zero", unit.offset);
    }
    state.props.push(Property::rational("Gamma", gamma, 100_000));
    Ok(UnitOutcome::Continue)
}

fn iccp<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, true, true);
    if state.seen.contains(SRGB) {
        info.policy(SRGB_ICCP_ID, "iCCP and sRGB chunks both present", unit.offset);
    }
    let head = cursor.read_bytes(unit.declared_length.min(81))?;
    let (keyword, rest) = split_nul(&head);
    check_keyword(unit, keyword, info);
    match rest.and_then(|r| r.first()) {
        Some(0) => {}
        Some(m) => info.policy_with(
            COMPRESSION_METHOD_ID,
            "iCCP compression method is not deflate",
            format!("method {}", m),
            unit.offset,
        ),
        None => info.policy(KEYWORD_ID, "iCCP profile name is not terminated", unit.offset),
    }
    let name = latin1(keyword);
    state.image.color_space.offer(format!("ICC: {}", name), Rank::Specific);
    state.props.push(Property::scalar("ICCProfileName", name));
    Ok(UnitOutcome::Continue)
}

fn sbit<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, true, true);
    let ct = state.color_type();
    let needed: u64 = match ct {
        0 => 1,
        2 | 3 => 3,
        4 => 2,
        _ => 4,
    };
    if unit.declared_length < needed {
        return Err(StructuralFault::InsufficientData {
            unit: unit.name.clone(),
            offset: unit.offset,
            declared: unit.declared_length,
            minimum: needed,
        });
    }
    if unit.declared_length > needed {
        info.policy(SBIT_ID, "sBIT length does not match the colour type", unit.offset);
    }
    let max = if ct == 3 {
        8
    } else {
        state.ihdr.map_or(16, |h| h.bit_depth)
    };
    let mut values = Vec::new();
    for _ in 0..needed {
        let b = cursor.read_u8()?;
        if b == 0 || b > max {
            info.policy_with(
                SBIT_ID,
                "sBIT value out of range",
                format!("{} (max {})", b, max),
                unit.offset,
            );
        }
        values.push(Value::from(b));
    }
    state.props.push(Property::array("SignificantBits", values));
    Ok(UnitOutcome::Continue)
}

fn srgb<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, true, true);
    if state.seen.contains(ICCP) {
        info.policy(SRGB_ICCP_ID, "iCCP and sRGB chunks both present", unit.offset);
    }
    let intent = cursor.read_u8()?;
    let name = match intent {
        0 => "Perceptual",
        1 => "Relative colorimetric",
        2 => "Saturation",
        3 => "Absolute colorimetric",
        _ => {
            info.policy_with(
                SRGB_INTENT_ID,
                "sRGB rendering intent out of range",
                intent.to_string(),
                unit.offset,
            );
            "Unknown"
        }
    };
    state.image.color_space.offer("sRGB".to_string(), Rank::Specific);
    state.props.push(Property::scalar("RenderingIntent", name));
    Ok(UnitOutcome::Continue)
}

fn text<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let payload = read_payload(unit, cursor, state.max_alloc)?;
    let (keyword, value) = split_nul(&payload);
    check_keyword(unit, keyword, info);
    if value.is_none() {
        info.policy(KEYWORD_ID, "tEXt keyword is not NUL-terminated", unit.offset);
    }
    state.texts.push(vec![
        Property::scalar("Keyword", latin1(keyword)),
        Property::scalar("Text", latin1(value.unwrap_or_default())),
    ]);
    Ok(UnitOutcome::Continue)
}

fn ztxt<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let head = cursor.read_bytes(unit.declared_length.min(81))?;
    let (keyword, rest) = split_nul(&head);
    check_keyword(unit, keyword, info);
    match rest.and_then(|r| r.first()) {
        Some(0) => {}
        Some(m) => info.policy_with(
            COMPRESSION_METHOD_ID,
            "zTXt compression method is not deflate",
            format!("method {}", m),
            unit.offset,
        ),
        None => info.policy(KEYWORD_ID, "zTXt keyword is not NUL-terminated", unit.offset),
    }
    let compressed = unit.declared_length.saturating_sub(keyword.len() as u64 + 2);
    state.texts.push(vec![
        Property::scalar("Keyword", latin1(keyword)),
        Property::scalar("CompressedBytes", compressed),
    ]);
    Ok(UnitOutcome::Continue)
}

fn itxt<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let payload = read_payload(unit, cursor, state.max_alloc)?;
    let (keyword, rest) = split_nul(&payload);
    check_keyword(unit, keyword, info);
    let mut group = vec![Property::scalar("Keyword", latin1(keyword))];
    let Some(rest) = rest.filter(|r| r.len() >= 2) else {
        info.policy(ITXT_ID, "iTXt chunk is missing its header fields", unit.offset);
        state.texts.push(group);
        return Ok(UnitOutcome::Continue);
    };
    let (flag, method) = (rest[0], rest[1]);
    if flag > 1 || (flag == 1 && method != 0) {
        info.policy_with(
            ITXT_ID,
            "iTXt compression flag or method is invalid",
            format!("flag {}, method {}", flag, method),
            unit.offset,
        );
    }
    let (language, rest) = split_nul(&rest[2..]);
    let (translated, text) = match rest {
        Some(r) => split_nul(r),
        None => (&[][..], None),
    };
    let Some(text) = text else {
        info.policy(ITXT_ID, "iTXt language or translated keyword is not terminated", unit.offset);
        state.texts.push(group);
        return Ok(UnitOutcome::Continue);
    };
    group.push(Property::scalar("Language", latin1(language)));
    group.push(Property::scalar(
        "TranslatedKeyword",
        String::from_utf8_lossy(translated).into_owned(),
    ));
    if flag == 1 {
        group.push(Property::scalar("CompressedBytes", text.len() as u64));
    } else {
        match std::str::from_utf8(text) {
            Ok(s) => group.push(Property::scalar("Text", s)),
            Err(_) => info.policy(ITXT_ID, "iTXt text is not valid UTF-8", unit.offset),
        }
    }
    state.texts.push(group);
    Ok(UnitOutcome::Continue)
}

fn bkgd<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, false, true);
    let ct = state.color_type();
    let needed: u64 = match ct {
        3 => 1,
        0 | 4 => 2,
        _ => 6,
    };
    if unit.declared_length < needed {
        return Err(StructuralFault::InsufficientData {
            unit: unit.name.clone(),
            offset: unit.offset,
            declared: unit.declared_length,
            minimum: needed,
        });
    }
    if unit.declared_length > needed {
        info.policy(BKGD_ID, "bKGD length does not match the colour type", unit.offset);
    }
    let values: Vec<Value> = if ct == 3 {
        let index = cursor.read_u8()?;
        match state.palette_entries {
            None => info.policy(NEEDS_PLTE_ID, "bKGD before PLTE in indexed-colour image", unit.offset),
            Some(n) if u32::from(index) >= n => {
                info.policy_with(BKGD_ID, "bKGD palette index out of range", index.to_string(), unit.offset)
            }
            Some(_) => {}
        }
        vec![Value::from(index)]
    } else {
        let mut v = Vec::new();
        for _ in 0..needed / 2 {
            v.push(Value::from(cursor.read_u16(BE)?));
        }
        v
    };
    state.props.push(Property::array("Background", values));
    Ok(UnitOutcome::Continue)
}

fn hist(unit: &Unit, state: &mut PngState, info: &mut RepInfo) -> UnitResult {
    must_precede(unit, state, info, false, true);
    match state.palette_entries {
        None => info.policy(NEEDS_PLTE_ID, "hIST without a preceding PLTE", unit.offset),
        Some(n) if unit.declared_length != u64::from(n) * 2 => info.policy_with(
            HIST_ID,
            "hIST length does not match the palette",
            format!("{} bytes for {} entries", unit.declared_length, n),
            unit.offset,
        ),
        Some(_) => {}
    }
    state
        .props
        .push(Property::scalar("HistogramEntries", unit.declared_length / 2));
    Ok(UnitOutcome::Continue)
}

fn trns(unit: &Unit, state: &mut PngState, info: &mut RepInfo) -> UnitResult {
    must_precede(unit, state, info, false, true);
    let len = unit.declared_length;
    match state.color_type() {
        4 | 6 => info.policy(TRNS_ID, "tRNS chunk in image with an alpha channel", unit.offset),
        3 => match state.palette_entries {
            None => info.policy(NEEDS_PLTE_ID, "tRNS before PLTE in indexed-colour image", unit.offset),
            Some(n) if len > u64::from(n) => {
                info.policy(TRNS_ID, "tRNS has more entries than the palette", unit.offset)
            }
            Some(_) => {}
        },
        0 if len != 2 => info.policy(TRNS_ID, "greyscale tRNS must be 2 bytes", unit.offset),
        2 if len != 6 => info.policy(TRNS_ID, "truecolour tRNS must be 6 bytes", unit.offset),
        _ => {}
    }
    state.props.push(Property::scalar("TransparencyBytes", len));
    Ok(UnitOutcome::Continue)
}

fn phys<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, false, true);
    let x = cursor.read_u32(BE)?;
    let y = cursor.read_u32(BE)?;
    let unit_spec = cursor.read_u8()?;
    let unit_name = match unit_spec {
        0 => "unknown",
        1 => "meter",
        _ => {
            info.policy_with(PHYS_UNIT_ID, "pHYs unit specifier out of range", unit_spec.to_string(), unit.offset);
            "unknown"
        }
    };
    if unit_spec == 1 {
        let img = &mut state.image;
        img.x_resolution.offer(Resolution { numerator: x, denominator: 1 }, Rank::Specific);
        img.y_resolution.offer(Resolution { numerator: y, denominator: 1 }, Rank::Specific);
        img.resolution_unit.offer(unit_name.to_string(), Rank::Specific);
    }
    state.props.push(Property::nested(
        "pHYs",
        vec![
            Property::scalar("PixelsPerUnitX", x),
            Property::scalar("PixelsPerUnitY", y),
            Property::scalar("Unit", unit_name),
        ],
    ));
    Ok(UnitOutcome::Continue)
}

fn splt<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, false, true);
    let head = cursor.read_bytes(unit.declared_length.min(81))?;
    let (name, rest) = split_nul(&head);
    check_keyword(unit, name, info);
    match rest.and_then(|r| r.first()) {
        Some(&depth) if depth == 8 || depth == 16 => {
            let entry = if depth == 8 { 6 } else { 10 };
            let body = unit.declared_length - name.len() as u64 - 2;
            if body % entry != 0 {
                info.policy(SPLT_ID, "sPLT length is not a whole number of entries", unit.offset);
            }
        }
        Some(depth) => info.policy_with(SPLT_ID, "sPLT sample depth must be 8 or 16", depth.to_string(), unit.offset),
        None => info.policy(KEYWORD_ID, "sPLT name is not terminated", unit.offset),
    }
    let name = Value::from(latin1(name));
    if state.palettes.contains(&name) {
        info.policy(SPLT_ID, "two sPLT chunks share a palette name", unit.offset);
    } else {
        state.palettes.push(name);
    }
    Ok(UnitOutcome::Continue)
}

fn time<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let year = cursor.read_u16(BE)?;
    let [month, day, hour, minute, second] = cursor.read_array::<5>()?;
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 60
    {
        info.policy(TIME_ID, "tIME field out of range", unit.offset);
    }
    state.props.push(Property::scalar(
        "LastModified",
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        ),
    ));
    Ok(UnitOutcome::Continue)
}

fn exif<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    must_precede(unit, state, info, false, true);
    let payload = read_payload(unit, cursor, state.max_alloc)?;
    match read_ifd0_summary(&payload) {
        Some(summary) => {
            // pHYs is the native resolution source; Exif only fills gaps.
            summary.apply(&mut state.image, Rank::Default);
            state.props.push(summary.to_property());
        }
        None => info.policy(EXIF_ID, "eXIf payload is not a TIFF structure", unit.offset),
    }
    Ok(UnitOutcome::Continue)
}

fn apng_violation(state: &mut PngState, info: &mut RepInfo, id: &'static str, text: &str, offset: u64) {
    state.apng.broken = true;
    info.policy(id, text, offset);
}

fn check_sequence(state: &mut PngState, info: &mut RepInfo, seq: u32, offset: u64) {
    if seq != state.apng.next_sequence {
        apng_violation(state, info, APNG_SEQUENCE_ID, "APNG sequence number out of order", offset);
    }
    state.apng.next_sequence = seq.wrapping_add(1);
}

fn actl<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let frames = cursor.read_u32(BE)?;
    let plays = cursor.read_u32(BE)?;
    if state.idat_seen {
        apng_violation(state, info, APNG_ID, "acTL chunk after IDAT", unit.offset);
    }
    if frames == 0 {
        apng_violation(state, info, APNG_ID, "acTL declares zero frames", unit.offset);
    }
    state.apng.num_frames = Some(frames);
    state.props.push(Property::nested(
        "Animation",
        vec![
            Property::scalar("NumFrames", frames),
            Property::scalar("NumPlays", plays),
        ],
    ));
    Ok(UnitOutcome::Continue)
}

fn fctl<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let seq = cursor.read_u32(BE)?;
    let width = cursor.read_u32(BE)?;
    let height = cursor.read_u32(BE)?;
    let x = cursor.read_u32(BE)?;
    let y = cursor.read_u32(BE)?;
    let delay_num = cursor.read_u16(BE)?;
    let delay_den = cursor.read_u16(BE)?;
    let dispose = cursor.read_u8()?;
    let blend = cursor.read_u8()?;

    if state.apng.num_frames.is_none() {
        apng_violation(state, info, APNG_ID, "fcTL without a preceding acTL", unit.offset);
    }
    check_sequence(state, info, seq, unit.offset);
    if let Some(h) = state.ihdr {
        let fits = width > 0
            && height > 0
            && u64::from(x) + u64::from(width) <= u64::from(h.width)
            && u64::from(y) + u64::from(height) <= u64::from(h.height);
        if !fits {
            apng_violation(state, info, APNG_ID, "fcTL frame region outside the canvas", unit.offset);
        }
        let is_default_image = !state.idat_seen && state.apng.fctl_count == 0;
        if is_default_image && (width != h.width || height != h.height || x != 0 || y != 0) {
            apng_violation(state, info, APNG_ID, "first fcTL does not cover the default image", unit.offset);
        }
    }
    if dispose > 2 || blend > 1 {
        apng_violation(state, info, APNG_ID, "fcTL dispose or blend operation out of range", unit.offset);
    }
    state.apng.fctl_count += 1;
    state.apng.frames.push(vec![
        Property::scalar("Width", width),
        Property::scalar("Height", height),
        Property::scalar("XOffset", x),
        Property::scalar("YOffset", y),
        Property::rational("Delay", u32::from(delay_num), u32::from(if delay_den == 0 { 100 } else { delay_den })),
    ]);
    Ok(UnitOutcome::Continue)
}

fn fdat<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut PngState,
    info: &mut RepInfo,
) -> UnitResult {
    let seq = cursor.read_u32(BE)?;
    if state.apng.num_frames.is_none() {
        apng_violation(state, info, APNG_ID, "fdAT without a preceding acTL", unit.offset);
    }
    if !state.idat_seen {
        apng_violation(state, info, APNG_ID, "fdAT before IDAT", unit.offset);
    }
    check_sequence(state, info, seq, unit.offset);
    Ok(UnitOutcome::Continue)
}

fn unknown<R: Read>(unit: &Unit, cursor: &mut ChecksummingCursor<R>, info: &mut RepInfo) -> UnitResult {
    match unit.category {
        Category::Critical => RuleClass::Policy.violated(
            info,
            UNKNOWN_CRITICAL_ID,
            unit.offset,
            format!("unknown critical chunk {}", unit.name),
        )?,
        Category::Ancillary => info.info(
            UNKNOWN_ANCILLARY_ID,
            format!("unknown ancillary chunk {} skipped", unit.name),
            Some(unit.offset),
        ),
    }
    pass_through(unit, cursor)?;
    Ok(UnitOutcome::Continue)
}
