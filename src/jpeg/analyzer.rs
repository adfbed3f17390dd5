//! JPEG grammar: SOI as the preamble, marker segments as units, EOI as the terminal.
//!
//! The data following an SOS header is entropy-coded and carries no length. It is
//! scanned byte by byte until a marker other than a stuffed `FF00` or a restart
//! marker appears; that marker is parked in the state and becomes the next unit.

use std::io::Read;

use log::{debug, trace};

use crate::cursor::{ChecksummingCursor, Endian};
use crate::driver::{self, Grammar};
use crate::error::StructuralFault;
use crate::jpeg::markers::{is_rst, is_standalone, SegmentKind, DISPATCH, EOI, SOF0, SOI, SOS};
use crate::jpeg::parser::{handle_segment, JpegState};
use crate::options::ParseOptions;
use crate::property::Property;
use crate::result::RepInfo;
use crate::unit::{Tag, UnitOutcome, UnitResult};

const MARKER_EXPECTED_ID: &str = "JPEG-MARKER-EXPECTED";
const INVALID_MARKER_ID: &str = "JPEG-INVALID-MARKER";
const SEGMENT_LENGTH_ID: &str = "JPEG-SEGMENT-LENGTH";
const SECOND_SOI_ID: &str = "JPEG-SOI";
const RST_OUTSIDE_SCAN_ID: &str = "JPEG-RST-OUTSIDE-SCAN";
const NO_FRAME_ID: &str = "JPEG-NO-FRAME";
const NO_SCAN_ID: &str = "JPEG-NO-SCAN";

/// Grammar for JPEG interchange format streams (JFIF, Exif and bare).
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegGrammar;

impl Grammar for JpegGrammar {
    type State = JpegState;
    const FORMAT: &'static str = "JPEG";

    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<JpegState, StructuralFault> {
        let soi = cursor.read_array::<2>()?;
        if soi != [0xFF, SOI] {
            return Err(StructuralFault::BadSignature {
                format: "JPEG",
                offset: 0,
            });
        }
        info.mime_type = Some("image/jpeg".to_string());
        Ok(JpegState::new(options.max_unit_alloc))
    }

    fn next_unit<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        state: &mut JpegState,
        info: &mut RepInfo,
    ) -> UnitResult {
        let (offset, marker) = match state.pending_marker.take() {
            Some(parked) => parked,
            None => read_marker(cursor)?,
        };

        if marker == 0x00 {
            return Err(StructuralFault::malformed(
                INVALID_MARKER_ID,
                offset,
                "0xFF00 is not a marker outside entropy-coded data",
            ));
        }
        if is_standalone(marker) {
            return match marker {
                EOI => Ok(UnitOutcome::Terminal),
                SOI => Err(StructuralFault::malformed(SECOND_SOI_ID, offset, "SOI inside the image")),
                m if is_rst(m) => {
                    info.policy(RST_OUTSIDE_SCAN_ID, format!("RST{} outside a scan", m & 0x07), offset);
                    Ok(UnitOutcome::Continue)
                }
                _ => Ok(UnitOutcome::Continue),
            };
        }

        let length = cursor.read_u16(Endian::Big)?;
        if length < 2 {
            return Err(StructuralFault::malformed(
                SEGMENT_LENGTH_ID,
                offset,
                format!("segment length {} is below 2", length),
            ));
        }
        let unit = DISPATCH.bind(Tag::from(marker), u64::from(length - 2), offset, cursor.bytes_consumed());
        debug!("JPEG segment {} at {} ({} bytes)", unit.name, offset, length);
        state.segments += 1;
        unit.require_min()?;

        handle_segment(SegmentKind::from_marker(marker), &unit, cursor, state, info)?;
        unit.finish_payload(cursor)?;

        if marker == SOS {
            scan_entropy_coded(cursor, state)?;
        }
        Ok(UnitOutcome::Continue)
    }

    fn finish(&self, state: JpegState, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
        if completed {
            let end = info.size.unwrap_or(0);
            if state.frame.is_none() {
                info.policy(NO_FRAME_ID, "no frame header before EOI", end);
            }
            if state.scans == 0 {
                info.policy(NO_SCAN_ID, "no scan before EOI", end);
            }
            if state.jfif {
                info.add_profile("JFIF");
            }
            if state.exif {
                info.add_profile("Exif");
            }
        }

        let mut jpeg = Vec::new();
        if let Some(frame) = &state.frame {
            jpeg.push(Property::scalar("Baseline", frame.marker == SOF0));
        }
        if !state.frames.is_empty() {
            jpeg.push(Property::group_list("Frames", state.frames));
        }
        jpeg.push(Property::scalar("Scans", state.scans));
        jpeg.push(Property::scalar("QuantizationTables", state.quantization_tables));
        jpeg.push(Property::scalar("HuffmanTables", state.huffman_tables));
        if let Some(interval) = state.restart_interval {
            jpeg.push(Property::scalar("RestartInterval", interval));
        }
        if state.hierarchical {
            jpeg.push(Property::scalar("Hierarchical", true));
        }
        jpeg.extend(state.props);
        if !state.comments.is_empty() {
            jpeg.push(Property::list("Comments", state.comments));
        }
        jpeg.push(Property::scalar("EntropyCodedBytes", state.entropy_bytes));
        info.properties.push(Property::nested("JPEGMetadata", jpeg));
        if let Some(image) = state.image.to_property() {
            info.properties.push(image);
        }
        Ok(())
    }
}

/// Read `FF xx`, skipping fill bytes. Returns the offset of the first `FF` and the code.
fn read_marker<R: Read>(cursor: &mut ChecksummingCursor<R>) -> Result<(u64, u8), StructuralFault> {
    let offset = cursor.bytes_consumed();
    let lead = cursor.read_u8()?;
    if lead != 0xFF {
        return Err(StructuralFault::malformed(
            MARKER_EXPECTED_ID,
            offset,
            format!("expected a marker, found 0x{:02X}", lead),
        ));
    }
    let mut code = cursor.read_u8()?;
    while code == 0xFF {
        code = cursor.read_u8()?;
    }
    Ok((offset, code))
}

/// Consume entropy-coded data up to the next real marker and park that marker.
fn scan_entropy_coded<R: Read>(
    cursor: &mut ChecksummingCursor<R>,
    state: &mut JpegState,
) -> Result<(), StructuralFault> {
    let start = cursor.bytes_consumed();
    loop {
        if cursor.read_u8()? != 0xFF {
            continue;
        }
        let at = cursor.bytes_consumed() - 1;
        let mut code = cursor.read_u8()?;
        while code == 0xFF {
            code = cursor.read_u8()?;
        }
        if code == 0x00 || is_rst(code) {
            continue;
        }
        state.entropy_bytes += at - start;
        trace!("JPEG scan data {}..{} ends at marker 0xFF{:02X}", start, at, code);
        state.pending_marker = Some((at, code));
        return Ok(());
    }
}

/// Validate a JPEG stream.
pub fn validate_jpeg<R: Read>(reader: R, options: &ParseOptions) -> RepInfo {
    driver::run(&JpegGrammar, reader, options)
}
