//! GIF block handlers and per-parse state.

use std::io::Read;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::error::StructuralFault;
use crate::gif::blocks::BlockKind;
use crate::metadata::{ImageMetadata, Rank};
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::text::latin1;
use crate::unit::{Unit, UnitOutcome, UnitResult};

const LE: Endian = Endian::Little;

pub const LZW_CODE_SIZE_ID: &str = "GIF-LZW-CODE-SIZE";
pub const IMAGE_BOUNDS_ID: &str = "GIF-IMAGE-BOUNDS";
pub const NO_IMAGE_DATA_ID: &str = "GIF-NO-IMAGE-DATA";
pub const MULTIPLE_GCE_ID: &str = "GIF-MULTIPLE-GCE";
pub const GCE_DISPOSAL_ID: &str = "GIF-GCE-DISPOSAL";
pub const GCE_TERMINATOR_ID: &str = "GIF-GCE-TERMINATOR";
pub const UNKNOWN_EXTENSION_ID: &str = "GIF-UNKNOWN-EXTENSION";

/// Header version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifVersion {
    V87a,
    V89a,
}

impl GifVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            GifVersion::V87a => "87a",
            GifVersion::V89a => "89a",
        }
    }
}

/// Logical screen descriptor fields.
#[derive(Debug, Clone, Copy)]
pub struct LogicalScreen {
    pub width: u16,
    pub height: u16,
    pub color_resolution: u8,
    pub global_table_entries: Option<u16>,
    pub background_index: u8,
    pub aspect_ratio: u8,
}

/// Per-parse GIF state.
#[derive(Debug)]
pub struct GifState {
    pub version: GifVersion,
    pub screen: LogicalScreen,
    pub images: u32,
    /// A graphic control extension is waiting for its graphic rendering block.
    pub pending_control: Option<(u64, Vec<Property>)>,
    pub image_groups: Vec<Vec<Property>>,
    pub comments: Vec<Value>,
    pub plain_text: Vec<Value>,
    pub applications: Vec<Value>,
    pub loop_count: Option<u16>,
    pub image: ImageMetadata,
    pub max_alloc: u64,
}

impl GifState {
    pub fn new(version: GifVersion, screen: LogicalScreen, max_alloc: u64) -> Self {
        let mut image = ImageMetadata::default();
        // The logical screen is only a default; the first image descriptor is specific.
        image.width.offer(u32::from(screen.width), Rank::Default);
        image.height.offer(u32::from(screen.height), Rank::Default);
        image
            .bits_per_sample
            .offer((screen.color_resolution + 1).to_string(), Rank::Default);
        image.samples_per_pixel.offer(1, Rank::Specific);
        image.color_space.offer("Palette".to_string(), Rank::Specific);
        image.compression.offer("LZW".to_string(), Rank::Specific);
        Self {
            version,
            screen,
            images: 0,
            pending_control: None,
            image_groups: Vec::new(),
            comments: Vec::new(),
            plain_text: Vec::new(),
            applications: Vec::new(),
            loop_count: None,
            image,
            max_alloc,
        }
    }
}

/// Entries in a colour table whose packed size field is `size`.
#[inline]
pub fn color_table_entries(size: u8) -> u16 {
    1u16 << ((size & 0x07) + 1)
}

/// Read a data sub-block chain through its zero-length terminator.
///
/// Returns the total data length and at most `keep` leading data bytes.
pub fn read_sub_blocks<R: Read>(
    cursor: &mut ChecksummingCursor<R>,
    keep: u64,
) -> Result<(u64, Vec<u8>), StructuralFault> {
    let mut total = 0u64;
    let mut kept = Vec::new();
    loop {
        let size = u64::from(cursor.read_u8()?);
        if size == 0 {
            return Ok((total, kept));
        }
        let take = keep.saturating_sub(kept.len() as u64).min(size);
        if take > 0 {
            kept.extend(cursor.read_bytes(take)?);
        }
        cursor.skip(size - take)?;
        total += size;
    }
}

pub fn handle_block<R: Read>(
    kind: BlockKind,
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut GifState,
    info: &mut RepInfo,
) -> UnitResult {
    match kind {
        BlockKind::Image => image(unit, cursor, state, info),
        BlockKind::Trailer => Ok(UnitOutcome::Terminal),
        BlockKind::GraphicControl => graphic_control(unit, cursor, state, info),
        BlockKind::PlainText => plain_text(unit, cursor, state),
        BlockKind::Comment => {
            let (_, text) = read_sub_blocks(cursor, state.max_alloc)?;
            state.comments.push(Value::from(latin1(&text)));
            Ok(UnitOutcome::Continue)
        }
        BlockKind::Application => application(unit, cursor, state),
        BlockKind::UnknownExtension => {
            info.info(
                UNKNOWN_EXTENSION_ID,
                format!("{} skipped", unit.name),
                Some(unit.offset),
            );
            read_sub_blocks(cursor, 0)?;
            Ok(UnitOutcome::Continue)
        }
    }
}

fn image<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut GifState,
    info: &mut RepInfo,
) -> UnitResult {
    let left = cursor.read_u16(LE)?;
    let top = cursor.read_u16(LE)?;
    let width = cursor.read_u16(LE)?;
    let height = cursor.read_u16(LE)?;
    let packed = cursor.read_u8()?;
    unit.finish_payload(cursor)?;

    let local_table = (packed & 0x80 != 0).then(|| color_table_entries(packed));
    if let Some(entries) = local_table {
        cursor.skip(u64::from(entries) * 3)?;
    }
    let code_size = cursor.read_u8()?;
    if !(2..=8).contains(&code_size) {
        info.policy_with(
            LZW_CODE_SIZE_ID,
            "LZW minimum code size out of range",
            code_size.to_string(),
            unit.offset,
        );
    }
    let right = u32::from(left) + u32::from(width);
    let bottom = u32::from(top) + u32::from(height);
    if right > u32::from(state.screen.width) || bottom > u32::from(state.screen.height) {
        info.policy_with(
            IMAGE_BOUNDS_ID,
            "image extends beyond the logical screen",
            format!("{}x{} at ({}, {})", width, height, left, top),
            unit.offset,
        );
    }
    let (data_len, _) = read_sub_blocks(cursor, 0)?;
    if data_len == 0 {
        info.policy(NO_IMAGE_DATA_ID, "image descriptor has no image data", unit.offset);
    }

    if state.images == 0 {
        state.image.width.offer(u32::from(width), Rank::Specific);
        state.image.height.offer(u32::from(height), Rank::Specific);
    }
    state.images += 1;

    let mut group = vec![
        Property::scalar("Left", left),
        Property::scalar("Top", top),
        Property::scalar("Width", width),
        Property::scalar("Height", height),
        Property::scalar("Interlaced", packed & 0x40 != 0),
    ];
    if let Some(entries) = local_table {
        group.push(Property::scalar("LocalColorTableSize", entries));
    }
    group.push(Property::scalar("LZWMinimumCodeSize", code_size));
    group.push(Property::scalar("CompressedBytes", data_len));
    if let Some((_, control)) = state.pending_control.take() {
        group.push(Property::nested("GraphicControl", control));
    }
    state.image_groups.push(group);
    Ok(UnitOutcome::Continue)
}

fn graphic_control<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut GifState,
    info: &mut RepInfo,
) -> UnitResult {
    let packed = cursor.read_u8()?;
    let delay = cursor.read_u16(LE)?;
    let transparent = cursor.read_u8()?;
    unit.finish_payload(cursor)?;
    let (trailing, _) = read_sub_blocks(cursor, 0)?;
    if trailing != 0 {
        info.policy(GCE_TERMINATOR_ID, "graphic control extension is not terminated", unit.offset);
    }

    if state.pending_control.is_some() {
        info.policy(
            MULTIPLE_GCE_ID,
            "more than one graphic control extension before a graphic block",
            unit.offset,
        );
    }
    let disposal = (packed >> 2) & 0x07;
    if disposal > 3 {
        info.policy_with(GCE_DISPOSAL_ID, "reserved disposal method", disposal.to_string(), unit.offset);
    }
    let mut control = vec![
        Property::scalar("DisposalMethod", disposal),
        Property::scalar("UserInput", packed & 0x02 != 0),
        Property::scalar("DelayTime", delay),
    ];
    if packed & 0x01 != 0 {
        control.push(Property::scalar("TransparentColorIndex", transparent));
    }
    state.pending_control = Some((unit.offset, control));
    Ok(UnitOutcome::Continue)
}

fn plain_text<R: Read>(unit: &Unit, cursor: &mut ChecksummingCursor<R>, state: &mut GifState) -> UnitResult {
    // Grid geometry, cell size and colours are not reported.
    unit.finish_payload(cursor)?;
    let (_, text) = read_sub_blocks(cursor, state.max_alloc)?;
    state.plain_text.push(Value::from(latin1(&text)));
    state.pending_control = None;
    Ok(UnitOutcome::Continue)
}

fn application<R: Read>(unit: &Unit, cursor: &mut ChecksummingCursor<R>, state: &mut GifState) -> UnitResult {
    let id = cursor.read_array::<8>()?;
    let auth = cursor.read_array::<3>()?;
    unit.finish_payload(cursor)?;
    let (_, head) = read_sub_blocks(cursor, 3)?;
    let name = format!("{}{}", latin1(&id), latin1(&auth));
    if (name == "NETSCAPE2.0" || name == "ANIMEXTS1.0") && head.first() == Some(&1) {
        state.loop_count = LE.u16_at(&head, 1);
    }
    state.applications.push(Value::from(name));
    Ok(UnitOutcome::Continue)
}
