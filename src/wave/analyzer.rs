//! WAVE grammar: RIFF header as the preamble, chunks until the end of the RIFF extent.

use std::io::Read;

use log::trace;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::driver::{self, Grammar};
use crate::error::StructuralFault;
use crate::metadata::Rank;
use crate::options::ParseOptions;
use crate::property::Property;
use crate::result::RepInfo;
use crate::unit::{RuleClass, UnitOutcome, UnitResult};
use crate::wave::chunks::{ChunkKind, CHUNK_HEADER_LEN, DISPATCH, FMT, RIFF, WAVE};
use crate::wave::parser::{handle_chunk, WaveState};

const RIFF_SIZE_ID: &str = "WAVE-RIFF-SIZE";
const CHUNK_EXTENT_ID: &str = "WAVE-CHUNK-EXTENT";
const DUPLICATE_ID: &str = "WAVE-DUPLICATE-CHUNK";
const PAD_MISSING_ID: &str = "WAVE-PAD-MISSING";
const NO_FMT_ID: &str = "WAVE-NO-FMT";
const NO_DATA_ID: &str = "WAVE-NO-DATA";
const NO_FACT_ID: &str = "WAVE-NO-FACT";

/// Grammar for RIFF WAVE files, including Broadcast Wave.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaveGrammar;

impl Grammar for WaveGrammar {
    type State = WaveState;
    const FORMAT: &'static str = "WAVE";

    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<WaveState, StructuralFault> {
        let riff = cursor.read_array::<4>()?;
        let size = cursor.read_u32(Endian::Little)?;
        let wave = cursor.read_array::<4>()?;
        if riff != RIFF || wave != WAVE {
            return Err(StructuralFault::BadSignature {
                format: "WAVE",
                offset: 0,
            });
        }
        if size < 4 {
            return Err(StructuralFault::malformed(
                RIFF_SIZE_ID,
                4,
                format!("RIFF size {} cannot hold the WAVE form type", size),
            ));
        }
        info.mime_type = Some("audio/vnd.wave".to_string());
        Ok(WaveState::new(CHUNK_HEADER_LEN + u64::from(size), options.max_unit_alloc))
    }

    fn next_unit<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        state: &mut WaveState,
        info: &mut RepInfo,
    ) -> UnitResult {
        let offset = cursor.bytes_consumed();
        if offset >= state.riff_end {
            return Ok(UnitOutcome::Terminal);
        }
        let tag = cursor.read_u32(Endian::Big)?;
        let length = u64::from(cursor.read_u32(Endian::Little)?);
        let unit = DISPATCH.bind(tag, length, offset, cursor.bytes_consumed());
        trace!("WAVE chunk {} len {} at {}", unit.name, length, offset);

        let payload_end = unit.payload_start + length;
        if payload_end > state.riff_end {
            return Err(StructuralFault::malformed(
                CHUNK_EXTENT_ID,
                offset,
                format!(
                    "{} chunk ends at {}, past the RIFF extent at {}",
                    unit.name, payload_end, state.riff_end
                ),
            ));
        }
        if let Some(first) = state.seen.note(tag, offset) {
            if !unit.duplicates_allowed {
                // Two format descriptions leave the sample data uninterpretable.
                let class = if tag == FMT {
                    RuleClass::Structural
                } else {
                    RuleClass::Policy
                };
                class.violated(
                    info,
                    DUPLICATE_ID,
                    offset,
                    format!("duplicate {} chunk (first at offset {})", unit.name, first),
                )?;
            }
        }

        unit.require_min()?;
        handle_chunk(ChunkKind::from_tag(tag), &unit, cursor, state, info)?;
        unit.finish_payload(cursor)?;

        if length % 2 == 1 {
            if payload_end < state.riff_end {
                cursor.skip(1)?;
            } else {
                info.info(PAD_MISSING_ID, format!("{} chunk has no pad byte", unit.name), Some(offset));
            }
        }
        Ok(UnitOutcome::Continue)
    }

    fn finish(&self, mut state: WaveState, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
        if let (Some(fmt), Some(len)) = (state.fmt, state.data_len) {
            if fmt.block_align > 0 {
                state
                    .audio
                    .sample_count
                    .offer(len / u64::from(fmt.block_align), Rank::Default);
            }
        }

        let mut wave = std::mem::take(&mut state.props);
        if let Some(len) = state.data_len {
            wave.push(Property::scalar("DataBytes", len));
        }
        if !state.info_text.is_empty() {
            wave.push(Property::map("Info", state.info_text));
        }
        if !wave.is_empty() {
            info.properties.push(Property::nested("WAVEMetadata", wave));
        }
        if let Some(audio) = state.audio.to_property() {
            info.properties.push(audio);
        }

        if !completed {
            return Ok(());
        }
        let end = info.size.unwrap_or(0);
        let Some(fmt) = state.fmt else {
            return Err(StructuralFault::malformed(NO_FMT_ID, end, "no fmt chunk"));
        };
        if state.data_len.is_none() {
            info.policy(NO_DATA_ID, "no data chunk", end);
        }
        if !fmt.is_pcm() && state.fact_samples.is_none() {
            info.policy(NO_FACT_ID, "compressed audio without a fact chunk", end);
        }
        if let Some(profile) = fmt.layout.profile() {
            info.add_profile(profile);
        }
        if let Some(version) = state.bext_version {
            info.add_profile(format!("Broadcast Wave Version {}", version));
        }
        Ok(())
    }
}

/// Validate a RIFF WAVE stream.
pub fn validate_wave<R: Read>(reader: R, options: &ParseOptions) -> RepInfo {
    driver::run(&WaveGrammar, reader, options)
}
