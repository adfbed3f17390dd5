//! JPEG segment handlers and per-parse state.

use std::io::Read;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::error::StructuralFault;
use crate::jpeg::markers::{is_lossless, process_name, SegmentKind, SOF0};
use crate::metadata::{ImageMetadata, Rank, Resolution};
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::text::{latin1, nul_terminated};
use crate::tiff::read_ifd0_summary;
use crate::unit::{pass_through, Unit, UnitOutcome, UnitResult};

const BE: Endian = Endian::Big;

pub const DQT_ID: &str = "JPEG-DQT";
pub const DHT_ID: &str = "JPEG-DHT";
pub const SOF_LENGTH_ID: &str = "JPEG-SOF-LENGTH";
pub const SOS_LENGTH_ID: &str = "JPEG-SOS-LENGTH";
pub const MULTIPLE_SOF_ID: &str = "JPEG-MULTIPLE-SOF";
pub const PRECISION_ID: &str = "JPEG-PRECISION";
pub const SOF_WIDTH_ID: &str = "JPEG-SOF-WIDTH";
pub const SOS_BEFORE_SOF_ID: &str = "JPEG-SOS-BEFORE-SOF";
pub const SOS_COMPONENT_ID: &str = "JPEG-SOS-COMPONENT";
pub const DRI_LENGTH_ID: &str = "JPEG-DRI-LENGTH";
pub const DNL_ID: &str = "JPEG-DNL";
pub const JFIF_POSITION_ID: &str = "JPEG-JFIF-POSITION";
pub const EXIF_ID: &str = "JPEG-EXIF";
pub const UNKNOWN_MARKER_ID: &str = "JPEG-UNKNOWN-MARKER";

const JFIF_ID: &[u8] = b"JFIF\0";
const JFXX_ID: &[u8] = b"JFXX\0";
const EXIF_HEADER: &[u8] = b"Exif\0\0";
const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_ID: &[u8] = b"ICC_PROFILE\0";
const ADOBE_ID: &[u8] = b"Adobe";

/// Frame header fields kept for scan checks.
#[derive(Debug, Clone)]
pub struct Frame {
    pub marker: u8,
    pub components: Vec<u8>,
}

/// Per-parse JPEG state.
#[derive(Debug)]
pub struct JpegState {
    /// A marker found while scanning entropy-coded data: (offset of its 0xFF, code).
    pub pending_marker: Option<(u64, u8)>,
    /// Segments seen since SOI.
    pub segments: u32,
    pub frame: Option<Frame>,
    pub hierarchical: bool,
    pub scans: u32,
    /// Entropy-coded bytes across all scans, stuffing and restarts included.
    pub entropy_bytes: u64,
    pub quantization_tables: u32,
    pub huffman_tables: u32,
    pub restart_interval: Option<u16>,
    pub jfif: bool,
    pub exif: bool,
    pub icc_chunks: u32,
    pub frames: Vec<Vec<Property>>,
    pub props: Vec<Property>,
    pub comments: Vec<Value>,
    pub image: ImageMetadata,
    pub max_alloc: u64,
}

impl JpegState {
    pub fn new(max_alloc: u64) -> Self {
        Self {
            pending_marker: None,
            segments: 0,
            frame: None,
            hierarchical: false,
            scans: 0,
            entropy_bytes: 0,
            quantization_tables: 0,
            huffman_tables: 0,
            restart_interval: None,
            jfif: false,
            exif: false,
            icc_chunks: 0,
            frames: Vec::new(),
            props: Vec::new(),
            comments: Vec::new(),
            image: ImageMetadata::default(),
            max_alloc,
        }
    }
}

pub fn handle_segment<R: Read>(
    kind: SegmentKind,
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
    info: &mut RepInfo,
) -> UnitResult {
    match kind {
        SegmentKind::Sof(marker) => sof(marker, unit, cursor, state, info)?,
        SegmentKind::Dht => dht(unit, cursor, state)?,
        SegmentKind::Dqt => dqt(unit, cursor, state)?,
        SegmentKind::Dac => pass_through(unit, cursor)?,
        SegmentKind::Dri => {
            if unit.declared_length != 2 {
                info.policy(DRI_LENGTH_ID, "DRI segment length is not 4", unit.offset);
            }
            state.restart_interval = Some(cursor.read_u16(BE)?);
        }
        SegmentKind::Sos => sos(unit, cursor, state, info)?,
        SegmentKind::Dnl => {
            if state.scans == 0 {
                info.policy(DNL_ID, "DNL segment before the first scan", unit.offset);
            }
            let lines = cursor.read_u16(BE)?;
            if lines > 0 {
                state.image.height.offer(u32::from(lines), Rank::Specific);
            }
        }
        SegmentKind::Dhp => {
            state.hierarchical = true;
            pass_through(unit, cursor)?;
        }
        SegmentKind::Exp => pass_through(unit, cursor)?,
        SegmentKind::App0 => app0(unit, cursor, state, info)?,
        SegmentKind::App1 => app1(unit, cursor, state, info)?,
        SegmentKind::App2 => app2(unit, cursor, state)?,
        SegmentKind::App14 => app14(unit, cursor, state)?,
        SegmentKind::OtherApp => pass_through(unit, cursor)?,
        SegmentKind::Com => {
            let text = cursor.read_bytes(unit.declared_length.min(state.max_alloc))?;
            state.comments.push(Value::from(latin1(&text)));
        }
        SegmentKind::Unknown => {
            info.info(UNKNOWN_MARKER_ID, format!("{} segment skipped", unit.name), Some(unit.offset));
            pass_through(unit, cursor)?;
        }
    }
    Ok(UnitOutcome::Continue)
}

fn sof<R: Read>(
    marker: u8,
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let precision = cursor.read_u8()?;
    let height = cursor.read_u16(BE)?;
    let width = cursor.read_u16(BE)?;
    let count = cursor.read_u8()?;
    if count == 0 || unit.declared_length != 6 + 3 * u64::from(count) {
        return Err(StructuralFault::malformed(
            SOF_LENGTH_ID,
            unit.offset,
            format!("{} length {} does not fit {} components", unit.name, unit.declared_length + 2, count),
        ));
    }
    let mut components = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let [id, _sampling, _table] = cursor.read_array::<3>()?;
        components.push(id);
    }

    if state.frame.is_some() && !state.hierarchical {
        info.policy(MULTIPLE_SOF_ID, "more than one frame header outside a hierarchical file", unit.offset);
    }
    let precision_ok = if marker == SOF0 {
        precision == 8
    } else if is_lossless(marker) {
        (2..=16).contains(&precision)
    } else {
        precision == 8 || precision == 12
    };
    if !precision_ok {
        info.policy_with(
            PRECISION_ID,
            format!("sample precision not allowed for {}", process_name(marker)),
            precision.to_string(),
            unit.offset,
        );
    }
    if width == 0 {
        info.policy(SOF_WIDTH_ID, "frame width is zero", unit.offset);
    }

    if state.frame.is_none() {
        let img = &mut state.image;
        img.width.offer(u32::from(width), Rank::Specific);
        if height > 0 {
            img.height.offer(u32::from(height), Rank::Specific);
        }
        img.samples_per_pixel.offer(u16::from(count), Rank::Specific);
        img.bits_per_sample.offer(
            vec![precision.to_string(); usize::from(count)].join(","),
            Rank::Specific,
        );
        img.compression.offer(process_name(marker).to_string(), Rank::Specific);
        let model = match count {
            1 => "Greyscale",
            3 => "YCbCr",
            4 => "CMYK",
            _ => "Unknown",
        };
        img.color_space.offer(model.to_string(), Rank::Default);
        state.frame = Some(Frame { marker, components });
    }
    state.frames.push(vec![
        Property::scalar("Process", process_name(marker)),
        Property::scalar("SamplePrecision", precision),
        Property::scalar("Lines", height),
        Property::scalar("SamplesPerLine", width),
        Property::scalar("Components", count),
    ]);
    Ok(())
}

fn dht<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
) -> Result<(), StructuralFault> {
    let mut left = unit.declared_length;
    while left > 0 {
        if left < 17 {
            return Err(StructuralFault::malformed(DHT_ID, unit.offset, "DHT table header is cut short"));
        }
        let class_id = cursor.read_u8()?;
        if class_id >> 4 > 1 || class_id & 0x0F > 3 {
            return Err(StructuralFault::malformed(
                DHT_ID,
                unit.offset,
                format!("invalid Huffman table class/id 0x{:02X}", class_id),
            ));
        }
        let counts = cursor.read_array::<16>()?;
        let symbols: u64 = counts.iter().map(|&c| u64::from(c)).sum();
        left -= 17;
        if symbols > left {
            return Err(StructuralFault::malformed(
                DHT_ID,
                unit.offset,
                format!("Huffman table declares {} symbols but {} bytes remain", symbols, left),
            ));
        }
        cursor.skip(symbols)?;
        left -= symbols;
        state.huffman_tables += 1;
    }
    Ok(())
}

fn dqt<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
) -> Result<(), StructuralFault> {
    let mut left = unit.declared_length;
    while left > 0 {
        let pq_tq = cursor.read_u8()?;
        let size = match pq_tq >> 4 {
            0 => 64,
            1 => 128,
            p => {
                return Err(StructuralFault::malformed(
                    DQT_ID,
                    unit.offset,
                    format!("invalid quantization table precision {}", p),
                ))
            }
        };
        if pq_tq & 0x0F > 3 || left < 1 + size {
            return Err(StructuralFault::malformed(
                DQT_ID,
                unit.offset,
                "quantization table does not fit its segment",
            ));
        }
        cursor.skip(size)?;
        left -= 1 + size;
        state.quantization_tables += 1;
    }
    Ok(())
}

fn sos<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let count = cursor.read_u8()?;
    if count == 0 || count > 4 || unit.declared_length != 4 + 2 * u64::from(count) {
        return Err(StructuralFault::malformed(
            SOS_LENGTH_ID,
            unit.offset,
            format!("SOS length {} does not fit {} components", unit.declared_length + 2, count),
        ));
    }
    let mut ids = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let [id, _tables] = cursor.read_array::<2>()?;
        ids.push(id);
    }
    match &state.frame {
        None => info.policy(SOS_BEFORE_SOF_ID, "scan header before any frame header", unit.offset),
        Some(frame) => {
            if let Some(id) = ids.iter().find(|id| !frame.components.contains(id)) {
                info.policy_with(
                    SOS_COMPONENT_ID,
                    "scan names a component the frame does not define",
                    id.to_string(),
                    unit.offset,
                );
            }
        }
    }
    state.scans += 1;
    Ok(())
}

fn app0<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let head = cursor.read_bytes(unit.declared_length.min(14))?;
    if head.starts_with(JFIF_ID) && head.len() >= 14 {
        if state.segments > 1 {
            info.policy(JFIF_POSITION_ID, "JFIF APP0 is not the first segment", unit.offset);
        }
        let units = head[7];
        let x = u32::from(BE.u16_at(&head, 8).unwrap_or(0));
        let y = u32::from(BE.u16_at(&head, 10).unwrap_or(0));
        let unit_name = match units {
            1 => "inch",
            2 => "centimeter",
            _ => "none",
        };
        if units == 1 || units == 2 {
            // Density from JFIF is only a default; Exif resolution is specific.
            let img = &mut state.image;
            img.x_resolution.offer(Resolution { numerator: x, denominator: 1 }, Rank::Default);
            img.y_resolution.offer(Resolution { numerator: y, denominator: 1 }, Rank::Default);
            img.resolution_unit.offer(unit_name.to_string(), Rank::Default);
        }
        state.jfif = true;
        state.props.push(Property::nested(
            "JFIF",
            vec![
                Property::scalar("Version", format!("{}.{:02}", head[5], head[6])),
                Property::scalar("DensityUnits", unit_name),
                Property::scalar("XDensity", x),
                Property::scalar("YDensity", y),
                Property::scalar("ThumbnailWidth", head[12]),
                Property::scalar("ThumbnailHeight", head[13]),
            ],
        ));
    } else if head.starts_with(JFXX_ID) && head.len() >= 6 {
        let format = match head[5] {
            0x10 => "JPEG",
            0x11 => "1 byte/pixel",
            0x13 => "3 bytes/pixel",
            _ => "unknown",
        };
        state.props.push(Property::scalar("JFXXThumbnail", format));
    }
    Ok(())
}

fn app1<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let probe = unit.declared_length.min(XMP_ID.len() as u64);
    let head = cursor.read_bytes(probe)?;
    if head.starts_with(EXIF_HEADER) {
        let rest = unit.remaining(cursor).min(state.max_alloc);
        let mut body = head[EXIF_HEADER.len()..].to_vec();
        body.extend(cursor.read_bytes(rest)?);
        match read_ifd0_summary(&body) {
            Some(summary) => {
                summary.apply(&mut state.image, Rank::Specific);
                state.props.push(summary.to_property());
                state.exif = true;
            }
            None => info.policy(EXIF_ID, "APP1 Exif body is not a readable TIFF structure", unit.offset),
        }
    } else if head.as_slice() == XMP_ID {
        state
            .props
            .push(Property::scalar("XMPBytes", unit.remaining(cursor)));
    }
    Ok(())
}

fn app2<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
) -> Result<(), StructuralFault> {
    let head = cursor.read_bytes(unit.declared_length.min(ICC_ID.len() as u64 + 2))?;
    if head.starts_with(ICC_ID) && head.len() == ICC_ID.len() + 2 {
        if state.icc_chunks == 0 {
            state.image.color_space.offer("ICC".to_string(), Rank::Specific);
            state.props.push(Property::scalar("ICCProfileChunks", head[ICC_ID.len() + 1]));
        }
        state.icc_chunks += 1;
    }
    Ok(())
}

fn app14<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
) -> Result<(), StructuralFault> {
    let head = cursor.read_bytes(unit.declared_length.min(12))?;
    if head.starts_with(ADOBE_ID) && head.len() == 12 {
        let transform = head[11];
        let model = match (transform, state.frame.as_ref().map(|f| f.components.len())) {
            (0, Some(4)) => "CMYK",
            (0, _) => "RGB",
            (1, _) => "YCbCr",
            (2, _) => "YCCK",
            _ => "Unknown",
        };
        state.image.color_space.offer(model.to_string(), Rank::Default);
        state.props.push(Property::nested(
            "Adobe",
            vec![
                Property::scalar("Version", BE.u16_at(&head, 5).unwrap_or(0)),
                Property::scalar("Transform", transform),
            ],
        ));
    } else {
        let name = nul_terminated(&head);
        if !name.is_empty() {
            state.props.push(Property::scalar("APP14", name));
        }
    }
    Ok(())
}
