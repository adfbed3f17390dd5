//! GIF grammar: header and logical screen as the preamble, then blocks until the trailer.

use std::io::Read;

use log::trace;

use crate::cursor::{ChecksummingCursor, Endian};
use crate::driver::{self, Grammar};
use crate::error::StructuralFault;
use crate::gif::blocks::{
    extension_tag, is_extension, BlockKind, APPLICATION, DISPATCH, EXTENSION_INTRODUCER, GIF87A,
    GIF89A, GRAPHIC_CONTROL, IMAGE, IMAGE_SEPARATOR, PLAIN_TEXT, TRAILER, TRAILER_BYTE,
};
use crate::gif::parser::{color_table_entries, handle_block, GifState, GifVersion, LogicalScreen};
use crate::options::ParseOptions;
use crate::property::Property;
use crate::result::RepInfo;
use crate::unit::UnitResult;

const BLOCK_INTRODUCER_ID: &str = "GIF-BLOCK-INTRODUCER";
const GCE_SIZE_ID: &str = "GIF-GCE-SIZE";
const EXTENSION_IN_87A_ID: &str = "GIF-EXTENSION-IN-87A";
const NO_IMAGE_ID: &str = "GIF-NO-IMAGE";
const GCE_UNUSED_ID: &str = "GIF-GCE-UNUSED";

/// Grammar for GIF87a and GIF89a.
#[derive(Debug, Default, Clone, Copy)]
pub struct GifGrammar;

impl Grammar for GifGrammar {
    type State = GifState;
    const FORMAT: &'static str = "GIF";

    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<GifState, StructuralFault> {
        let sig = cursor.read_array::<6>()?;
        let version = match &sig {
            GIF87A => GifVersion::V87a,
            GIF89A => GifVersion::V89a,
            _ => {
                return Err(StructuralFault::BadSignature {
                    format: "GIF",
                    offset: 0,
                })
            }
        };
        info.mime_type = Some("image/gif".to_string());
        info.version = Some(version.as_str().to_string());

        let width = cursor.read_u16(Endian::Little)?;
        let height = cursor.read_u16(Endian::Little)?;
        let packed = cursor.read_u8()?;
        let background_index = cursor.read_u8()?;
        let aspect_ratio = cursor.read_u8()?;
        let global_table_entries = (packed & 0x80 != 0).then(|| color_table_entries(packed));
        if let Some(entries) = global_table_entries {
            cursor.skip(u64::from(entries) * 3)?;
        }
        let screen = LogicalScreen {
            width,
            height,
            color_resolution: (packed >> 4) & 0x07,
            global_table_entries,
            background_index,
            aspect_ratio,
        };
        Ok(GifState::new(version, screen, options.max_unit_alloc))
    }

    fn next_unit<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        state: &mut GifState,
        info: &mut RepInfo,
    ) -> UnitResult {
        let offset = cursor.bytes_consumed();
        let (tag, declared) = match cursor.read_u8()? {
            EXTENSION_INTRODUCER => {
                let tag = extension_tag(cursor.read_u8()?);
                // Extensions with a fixed part announce its size in the first sub-block byte.
                let declared = match tag {
                    PLAIN_TEXT | GRAPHIC_CONTROL | APPLICATION => u64::from(cursor.read_u8()?),
                    _ => 0,
                };
                (tag, declared)
            }
            IMAGE_SEPARATOR => (IMAGE, 9),
            TRAILER_BYTE => (TRAILER, 0),
            other => {
                return Err(StructuralFault::malformed(
                    BLOCK_INTRODUCER_ID,
                    offset,
                    format!("unknown block introducer 0x{:02X}", other),
                ))
            }
        };
        let unit = DISPATCH.bind(tag, declared, offset, cursor.bytes_consumed());
        trace!("GIF block {} at {}", unit.name, offset);

        if state.version == GifVersion::V87a && is_extension(tag) {
            info.policy(
                EXTENSION_IN_87A_ID,
                format!("{} in a GIF87a file", unit.name),
                offset,
            );
        }
        if tag == GRAPHIC_CONTROL && declared != 4 {
            return Err(StructuralFault::malformed(
                GCE_SIZE_ID,
                offset,
                format!("graphic control block size is {}, not 4", declared),
            ));
        }
        unit.require_min()?;

        let Some(kind) = BlockKind::from_tag(tag) else {
            return Err(StructuralFault::malformed(
                BLOCK_INTRODUCER_ID,
                offset,
                format!("no handler for {}", unit.name),
            ));
        };
        handle_block(kind, &unit, cursor, state, info)
    }

    fn finish(&self, state: GifState, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
        if completed {
            let end = info.size.unwrap_or(0);
            if state.images == 0 {
                info.policy(NO_IMAGE_ID, "file contains no image", end);
            }
            if let Some((at, _)) = &state.pending_control {
                info.policy(
                    GCE_UNUSED_ID,
                    "graphic control extension is not followed by a graphic block",
                    *at,
                );
            }
            info.add_profile(match state.version {
                GifVersion::V87a => "GIF 87a",
                GifVersion::V89a => "GIF 89a",
            });
        }

        let screen = &state.screen;
        let mut gif = vec![
            Property::scalar("Version", state.version.as_str()),
            Property::scalar("LogicalScreenWidth", screen.width),
            Property::scalar("LogicalScreenHeight", screen.height),
            Property::scalar("ColorResolution", screen.color_resolution + 1),
            Property::scalar("BackgroundColorIndex", screen.background_index),
            Property::scalar("PixelAspectRatio", screen.aspect_ratio),
        ];
        if let Some(entries) = screen.global_table_entries {
            gif.push(Property::scalar("GlobalColorTableSize", entries));
        }
        if !state.image_groups.is_empty() {
            gif.push(Property::group_list("Images", state.image_groups));
        }
        if !state.comments.is_empty() {
            gif.push(Property::list("Comments", state.comments));
        }
        if !state.plain_text.is_empty() {
            gif.push(Property::list("PlainText", state.plain_text));
        }
        if !state.applications.is_empty() {
            gif.push(Property::list("Applications", state.applications));
        }
        if let Some(loops) = state.loop_count {
            gif.push(Property::scalar("LoopCount", loops));
        }
        info.properties.push(Property::nested("GIFMetadata", gif));
        if let Some(image) = state.image.to_property() {
            info.properties.push(image);
        }
        Ok(())
    }
}

/// Validate a GIF stream.
pub fn validate_gif<R: Read>(reader: R, options: &ParseOptions) -> RepInfo {
    driver::run(&GifGrammar, reader, options)
}
