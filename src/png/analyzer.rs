//! PNG grammar: signature, chunk framing, CRC check and whole-document rules.

use std::io::Read;

use log::trace;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::driver::{self, Grammar};
use crate::error::StructuralFault;
use crate::options::ParseOptions;
use crate::png::chunks::{
    is_valid_type, reserved_bit_set, ChunkKind, DISPATCH, IDAT, IHDR, MAX_CHUNK_LEN, PNG_SIGNATURE,
};
use crate::png::parser::{handle_chunk, PngState, APNG_ID, IHDR_FIRST_ID};
use crate::property::{Property, Value};
use crate::result::RepInfo;
use crate::unit::{Category, RuleClass, UnitResult};

const CHUNK_LENGTH_ID: &str = "PNG-CHUNK-LENGTH";
const CHUNK_TYPE_ID: &str = "PNG-CHUNK-TYPE";
const RESERVED_BIT_ID: &str = "PNG-RESERVED-BIT";
const DUPLICATE_ID: &str = "PNG-DUPLICATE-CHUNK";

/// Grammar for PNG and its APNG extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngGrammar;

impl Grammar for PngGrammar {
    type State = PngState;
    const FORMAT: &'static str = "PNG";

    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<PngState, StructuralFault> {
        let sig = cursor.read_array::<8>()?;
        if sig != PNG_SIGNATURE {
            return Err(StructuralFault::BadSignature {
                format: "PNG",
                offset: 0,
            });
        }
        info.mime_type = Some("image/png".to_string());
        info.version = Some("1.2".to_string());
        Ok(PngState::new(options.max_unit_alloc))
    }

    fn next_unit<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        state: &mut PngState,
        info: &mut RepInfo,
    ) -> UnitResult {
        let offset = cursor.bytes_consumed();
        let length = cursor.read_u32(Endian::Big)?;
        // The CRC covers type and payload, not the length field.
        cursor.begin_crc();
        let type_bytes = cursor.read_array::<4>()?;

        if length > MAX_CHUNK_LEN {
            return Err(StructuralFault::malformed(
                CHUNK_LENGTH_ID,
                offset,
                format!("chunk length {} exceeds 2^31-1", length),
            ));
        }
        if !is_valid_type(&type_bytes) {
            return Err(StructuralFault::malformed(
                CHUNK_TYPE_ID,
                offset,
                format!("chunk type {:02X?} is not four ASCII letters", type_bytes),
            ));
        }

        let tag = u32::from_be_bytes(type_bytes);
        let unit = DISPATCH.bind(tag, u64::from(length), offset, cursor.bytes_consumed());
        trace!("PNG chunk {} len {} at {}", unit.name, length, offset);

        if state.ihdr.is_none() && tag != IHDR {
            return Err(StructuralFault::malformed(
                IHDR_FIRST_ID,
                offset,
                format!("first chunk is {}, not IHDR", unit.name),
            ));
        }
        if reserved_bit_set(tag) {
            info.policy(RESERVED_BIT_ID, format!("reserved bit set in chunk type {}", unit.name), offset);
        }
        if tag != IDAT && state.idat_seen {
            state.idat_closed = true;
        }
        if let Some(first) = state.seen.note(tag, offset) {
            if !unit.duplicates_allowed {
                let class = match unit.category {
                    Category::Critical => RuleClass::Structural,
                    Category::Ancillary => RuleClass::Policy,
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
        let outcome = handle_chunk(ChunkKind::from_tag(tag), &unit, cursor, state, info)?;
        unit.finish_payload(cursor)?;

        let (stored, computed) = cursor.read_crc_trailer(Endian::Big)?;
        if stored != computed {
            return Err(StructuralFault::ChecksumMismatch {
                offset,
                stored,
                computed,
            });
        }
        Ok(outcome)
    }

    fn finish(&self, mut state: PngState, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
        if completed {
            if let Some(declared) = state.apng.num_frames {
                if declared != state.apng.fctl_count {
                    state.apng.broken = true;
                    let at = info.size.unwrap_or(0);
                    info.policy_with(
                        APNG_ID,
                        "acTL frame count does not match the fcTL chunks",
                        format!("declared {}, found {}", declared, state.apng.fctl_count),
                        at,
                    );
                }
                if !state.apng.broken {
                    info.add_profile("APNG");
                }
            }
        }

        let mut png = std::mem::take(&mut state.props);
        if !state.texts.is_empty() {
            png.push(Property::group_list("TextualData", state.texts));
        }
        if !state.palettes.is_empty() {
            png.push(Property::set("SuggestedPalettes", state.palettes));
        }
        if !state.apng.frames.is_empty() {
            png.push(Property::group_list("Frames", state.apng.frames));
        }
        if state.idat_seen {
            png.push(Property::scalar("CompressedDataBytes", Value::Uint(state.idat_bytes)));
        }
        if !png.is_empty() {
            info.properties.push(Property::nested("PNGMetadata", png));
        }
        if let Some(image) = state.image.to_property() {
            info.properties.push(image);
        }
        Ok(())
    }
}

/// Validate a PNG (or APNG) stream.
pub fn validate_png<R: Read>(reader: R, options: &ParseOptions) -> RepInfo {
    driver::run(&PngGrammar, reader, options)
}
