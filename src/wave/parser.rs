//! WAVE chunk handlers and per-parse state.

use std::io::Read;

use indexmap::IndexMap;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::error::StructuralFault;
use crate::metadata::{AudioMetadata, Rank};
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::text::{latin1, nul_terminated};
use crate::unit::{fourcc_name, pass_through, SeenUnits, Unit, UnitOutcome, UnitResult};
use crate::wave::chunks::{format_name, ChunkKind, CHUNK_HEADER_LEN, FMT, INFO};

const LE: Endian = Endian::Little;

pub const DATA_BEFORE_FMT_ID: &str = "WAVE-DATA-BEFORE-FMT";
pub const BLOCK_ALIGN_ID: &str = "WAVE-BLOCK-ALIGN";
pub const BYTE_RATE_ID: &str = "WAVE-BYTE-RATE";
pub const FMT_EXTENSION_ID: &str = "WAVE-FMT-EXTENSION";
pub const CUE_LENGTH_ID: &str = "WAVE-CUE-LENGTH";
pub const LIST_LENGTH_ID: &str = "WAVE-LIST-LENGTH";
pub const SMPL_LENGTH_ID: &str = "WAVE-SMPL-LENGTH";
pub const UNKNOWN_CHUNK_ID: &str = "WAVE-UNKNOWN-CHUNK";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Which structure the fmt chunk uses; each one is a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmtLayout {
    /// 14-byte WAVEFORMAT without a bits-per-sample field.
    WaveFormat,
    PcmWaveFormat,
    WaveFormatEx,
    WaveFormatExtensible,
}

impl FmtLayout {
    pub fn profile(self) -> Option<&'static str> {
        match self {
            FmtLayout::WaveFormat => None,
            FmtLayout::PcmWaveFormat => Some("PCMWAVEFORMAT"),
            FmtLayout::WaveFormatEx => Some("WAVEFORMATEX"),
            FmtLayout::WaveFormatExtensible => Some("WAVEFORMATEXTENSIBLE"),
        }
    }
}

/// Decoded fmt chunk.
#[derive(Debug, Clone, Copy)]
pub struct Fmt {
    /// For WAVEFORMATEXTENSIBLE, the format code carried in the sub-format GUID.
    pub effective_tag: u16,
    pub block_align: u16,
    pub layout: FmtLayout,
}

impl Fmt {
    pub fn is_pcm(&self) -> bool {
        self.effective_tag == WAVE_FORMAT_PCM
    }
}

/// Per-parse WAVE state.
#[derive(Debug)]
pub struct WaveState {
    /// Offset one past the last byte covered by the RIFF size field.
    pub riff_end: u64,
    pub seen: SeenUnits,
    pub fmt: Option<Fmt>,
    pub data_len: Option<u64>,
    pub fact_samples: Option<u32>,
    pub bext_version: Option<u16>,
    pub info_text: IndexMap<String, Value>,
    pub props: Vec<Property>,
    pub audio: AudioMetadata,
    pub max_alloc: u64,
}

impl WaveState {
    pub fn new(riff_end: u64, max_alloc: u64) -> Self {
        Self {
            riff_end,
            seen: SeenUnits::default(),
            fmt: None,
            data_len: None,
            fact_samples: None,
            bext_version: None,
            info_text: IndexMap::new(),
            props: Vec::new(),
            audio: AudioMetadata::default(),
            max_alloc,
        }
    }
}

pub fn handle_chunk<R: Read>(
    kind: ChunkKind,
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut WaveState,
    info: &mut RepInfo,
) -> UnitResult {
    match kind {
        ChunkKind::Fmt => fmt(unit, cursor, state, info)?,
        ChunkKind::Data => {
            if !state.seen.contains(FMT) {
                info.policy(DATA_BEFORE_FMT_ID, "data chunk before fmt chunk", unit.offset);
            }
            state.data_len = Some(unit.declared_length);
            pass_through(unit, cursor)?;
        }
        ChunkKind::Fact => {
            let samples = cursor.read_u32(LE)?;
            state.fact_samples = Some(samples);
            state.audio.sample_count.offer(u64::from(samples), Rank::Specific);
        }
        ChunkKind::Cue => cue(unit, cursor, state, info)?,
        ChunkKind::List => list(unit, cursor, state, info)?,
        ChunkKind::Bext => bext(cursor, state)?,
        ChunkKind::Smpl => smpl(unit, cursor, state, info)?,
        ChunkKind::Inst => inst(cursor, state)?,
        ChunkKind::Unknown => {
            info.info(UNKNOWN_CHUNK_ID, format!("{} chunk skipped", unit.name), Some(unit.offset));
            pass_through(unit, cursor)?;
        }
    }
    Ok(UnitOutcome::Continue)
}

fn fmt<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut WaveState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let format_tag = cursor.read_u16(LE)?;
    let channels = cursor.read_u16(LE)?;
    let sample_rate = cursor.read_u32(LE)?;
    let byte_rate = cursor.read_u32(LE)?;
    let block_align = cursor.read_u16(LE)?;
    let bits = if unit.declared_length >= 16 {
        Some(cursor.read_u16(LE)?)
    } else {
        None
    };

    let mut layout = match bits {
        None => FmtLayout::WaveFormat,
        Some(_) if unit.declared_length < 18 => FmtLayout::PcmWaveFormat,
        Some(_) => FmtLayout::WaveFormatEx,
    };
    let mut effective_tag = format_tag;
    let mut fmt_props = Vec::new();
    if layout == FmtLayout::WaveFormatEx {
        let extra = cursor.read_u16(LE)?;
        if u64::from(extra) > unit.remaining(cursor) {
            info.policy_with(
                FMT_EXTENSION_ID,
                "fmt extension size exceeds the chunk",
                format!("cbSize {}, {} bytes left", extra, unit.remaining(cursor)),
                unit.offset,
            );
        } else if format_tag == WAVE_FORMAT_EXTENSIBLE {
            if extra < 22 {
                info.policy_with(
                    FMT_EXTENSION_ID,
                    "WAVEFORMATEXTENSIBLE needs a 22-byte extension",
                    extra.to_string(),
                    unit.offset,
                );
            } else {
                let valid_bits = cursor.read_u16(LE)?;
                let channel_mask = cursor.read_u32(LE)?;
                let guid = cursor.read_array::<16>()?;
                effective_tag = u16::from_le_bytes([guid[0], guid[1]]);
                layout = FmtLayout::WaveFormatExtensible;
                fmt_props.push(Property::scalar("ValidBitsPerSample", valid_bits));
                fmt_props.push(Property::scalar("ChannelMask", channel_mask));
                fmt_props.push(Property::scalar("SubFormat", format_name(effective_tag)));
            }
        }
    }

    if effective_tag == WAVE_FORMAT_PCM {
        if let Some(bits) = bits {
            let expected = u32::from(channels) * ((u32::from(bits) + 7) / 8);
            if u32::from(block_align) != expected {
                info.policy_with(
                    BLOCK_ALIGN_ID,
                    "block align does not match channels and sample size",
                    format!("declared {}, expected {}", block_align, expected),
                    unit.offset,
                );
            }
        }
        if u64::from(byte_rate) != u64::from(sample_rate) * u64::from(block_align) {
            info.policy_with(
                BYTE_RATE_ID,
                "byte rate is not sample rate times block align",
                format!("declared {}", byte_rate),
                unit.offset,
            );
        }
    }

    let audio = &mut state.audio;
    audio.format.offer(format_name(effective_tag).to_string(), Rank::Specific);
    audio.sample_rate.offer(sample_rate, Rank::Specific);
    audio.channels.offer(channels, Rank::Specific);
    if let Some(bits) = bits {
        audio.bits_per_sample.offer(bits, Rank::Specific);
    }
    audio.block_align.offer(block_align, Rank::Specific);
    audio.byte_rate.offer(byte_rate, Rank::Specific);

    let mut props = vec![Property::scalar("FormatTag", format_tag)];
    props.extend(fmt_props);
    state.props.push(Property::nested("Format", props));
    state.fmt = Some(Fmt {
        effective_tag,
        block_align,
        layout,
    });
    Ok(())
}

fn cue<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut WaveState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let count = cursor.read_u32(LE)?;
    let needed = 4 + u64::from(count) * 24;
    if needed > unit.declared_length {
        info.policy_with(
            CUE_LENGTH_ID,
            "cue point count does not fit the chunk",
            format!("{} points need {} bytes", count, needed),
            unit.offset,
        );
        return Ok(());
    }
    let mut points = Vec::new();
    for _ in 0..count {
        let id = cursor.read_u32(LE)?;
        let _position = cursor.read_u32(LE)?;
        let _chunk = cursor.read_array::<4>()?;
        let _chunk_start = cursor.read_u32(LE)?;
        let _block_start = cursor.read_u32(LE)?;
        let sample_offset = cursor.read_u32(LE)?;
        points.push(vec![
            Property::scalar("ID", id),
            Property::scalar("SampleOffset", sample_offset),
        ]);
    }
    state.props.push(Property::group_list("CuePoints", points));
    Ok(())
}

/// LIST chunk. Only INFO lists are interpreted; each sub-chunk is id, length, text, pad.
fn list<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut WaveState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let list_type = cursor.read_array::<4>()?;
    if list_type != INFO {
        state
            .props
            .push(Property::scalar("ListType", latin1(&list_type)));
        return Ok(());
    }
    while unit.remaining(cursor) >= CHUNK_HEADER_LEN {
        let at = cursor.bytes_consumed();
        let id = cursor.read_u32(Endian::Big)?;
        let len = u64::from(cursor.read_u32(LE)?);
        let padded = len + (len & 1);
        let left = unit.remaining(cursor);
        if len > left {
            info.policy_with(
                LIST_LENGTH_ID,
                "INFO sub-chunk runs past the LIST chunk",
                fourcc_name(id),
                at,
            );
            return Ok(());
        }
        let text = cursor.read_bytes(len.min(state.max_alloc))?;
        cursor.skip(len - text.len() as u64)?;
        // A missing final pad byte is tolerated.
        cursor.skip((padded - len).min(unit.remaining(cursor)))?;
        state
            .info_text
            .insert(fourcc_name(id), Value::from(nul_terminated(&text)));
    }
    Ok(())
}

fn bext<R: Read>(cursor: &mut ChecksummingCursor<R>, state: &mut WaveState) -> Result<(), StructuralFault> {
    let description = cursor.read_array::<256>()?;
    let originator = cursor.read_array::<32>()?;
    let originator_ref = cursor.read_array::<32>()?;
    let date = cursor.read_array::<10>()?;
    let time = cursor.read_array::<8>()?;
    let time_reference = cursor.read_u64(LE)?;
    let version = cursor.read_u16(LE)?;
    state.bext_version = Some(version);
    state.props.push(Property::nested(
        "BroadcastExtension",
        vec![
            Property::scalar("Description", nul_terminated(&description)),
            Property::scalar("Originator", nul_terminated(&originator)),
            Property::scalar("OriginatorReference", nul_terminated(&originator_ref)),
            Property::scalar("OriginationDate", latin1(&date)),
            Property::scalar("OriginationTime", latin1(&time)),
            Property::scalar("TimeReference", time_reference),
            Property::scalar("Version", version),
        ],
    ));
    Ok(())
}

fn smpl<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
    state: &mut WaveState,
    info: &mut RepInfo,
) -> Result<(), StructuralFault> {
    let _manufacturer = cursor.read_u32(LE)?;
    let _product = cursor.read_u32(LE)?;
    let period = cursor.read_u32(LE)?;
    let unity_note = cursor.read_u32(LE)?;
    let _pitch_fraction = cursor.read_u32(LE)?;
    let _smpte_format = cursor.read_u32(LE)?;
    let _smpte_offset = cursor.read_u32(LE)?;
    let loops = cursor.read_u32(LE)?;
    let _sampler_data = cursor.read_u32(LE)?;
    if 36 + u64::from(loops) * 24 > unit.declared_length {
        info.policy_with(
            SMPL_LENGTH_ID,
            "sample loop count does not fit the chunk",
            loops.to_string(),
            unit.offset,
        );
    }
    state.props.push(Property::nested(
        "Sampler",
        vec![
            Property::scalar("SamplePeriod", period),
            Property::scalar("MIDIUnityNote", unity_note),
            Property::scalar("SampleLoops", loops),
        ],
    ));
    Ok(())
}

fn inst<R: Read>(cursor: &mut ChecksummingCursor<R>, state: &mut WaveState) -> Result<(), StructuralFault> {
    let [note, fine_tune, gain, low_note, high_note, low_velocity, high_velocity] = cursor.read_array::<7>()?;
    state.props.push(Property::nested(
        "Instrument",
        vec![
            Property::scalar("UnshiftedNote", note),
            Property::scalar("FineTune", Value::Int(i64::from(fine_tune as i8))),
            Property::scalar("Gain", Value::Int(i64::from(gain as i8))),
            Property::scalar("LowNote", low_note),
            Property::scalar("HighNote", high_note),
            Property::scalar("LowVelocity", low_velocity),
            Property::scalar("HighVelocity", high_velocity),
        ],
    ));
    Ok(())
}
