//! GIF block tags. Extensions are keyed as `0x21nn` by their label byte.

use crate::unit::{Category, Dispatcher, Tag, UnitSpec};

pub const GIF87A: &[u8; 6] = b"GIF87a";
pub const GIF89A: &[u8; 6] = b"GIF89a";

pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const IMAGE_SEPARATOR: u8 = 0x2C;
pub const TRAILER_BYTE: u8 = 0x3B;

pub const IMAGE: Tag = IMAGE_SEPARATOR as Tag;
pub const TRAILER: Tag = TRAILER_BYTE as Tag;
pub const PLAIN_TEXT: Tag = extension_tag(0x01);
pub const GRAPHIC_CONTROL: Tag = extension_tag(0xF9);
pub const COMMENT: Tag = extension_tag(0xFE);
pub const APPLICATION: Tag = extension_tag(0xFF);

#[inline]
pub const fn extension_tag(label: u8) -> Tag {
    ((EXTENSION_INTRODUCER as Tag) << 8) | label as Tag
}

#[inline]
pub fn is_extension(tag: Tag) -> bool {
    tag >> 8 == EXTENSION_INTRODUCER as Tag
}

use Category::{Ancillary, Critical};

/// Minimum lengths are the fixed-size part that precedes any data sub-blocks.
pub const BLOCK_TABLE: &[UnitSpec] = &[
    UnitSpec::new(IMAGE, "ImageDescriptor", Critical, true, 9),
    UnitSpec::new(TRAILER, "Trailer", Critical, false, 0),
    UnitSpec::new(PLAIN_TEXT, "PlainTextExtension", Ancillary, true, 12),
    UnitSpec::new(GRAPHIC_CONTROL, "GraphicControlExtension", Ancillary, true, 4),
    UnitSpec::new(COMMENT, "CommentExtension", Ancillary, true, 0),
    UnitSpec::new(APPLICATION, "ApplicationExtension", Ancillary, true, 11),
];

/// Unknown extensions can be skipped through their sub-blocks; anything else cannot.
fn unknown_category(tag: Tag) -> Category {
    if is_extension(tag) {
        Ancillary
    } else {
        Critical
    }
}

fn block_name(tag: Tag) -> String {
    if is_extension(tag) {
        format!("Extension 0x{:02X}", tag & 0xFF)
    } else {
        format!("Block 0x{:02X}", tag)
    }
}

pub const DISPATCH: Dispatcher = Dispatcher::new(BLOCK_TABLE, unknown_category, block_name);

/// Handler variant for a block tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Image,
    Trailer,
    PlainText,
    GraphicControl,
    Comment,
    Application,
    UnknownExtension,
}

impl BlockKind {
    /// `None` for a tag that is neither a known block nor an extension.
    pub fn from_tag(tag: Tag) -> Option<Self> {
        Some(match tag {
            IMAGE => BlockKind::Image,
            TRAILER => BlockKind::Trailer,
            PLAIN_TEXT => BlockKind::PlainText,
            GRAPHIC_CONTROL => BlockKind::GraphicControl,
            COMMENT => BlockKind::Comment,
            APPLICATION => BlockKind::Application,
            t if is_extension(t) => BlockKind::UnknownExtension,
            _ => return None,
        })
    }
}
