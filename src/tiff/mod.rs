//! TIFF validator (TIFF 6.0 classic layout, with Exif, GPS, SubIFD, DNG and TIFF/EP).
//!
//! The stream is buffered whole because directories are reached through offsets. Each
//! IFD is one unit; its entries are checked against per-namespace tag tables.
//!
//! Structural faults: bad header, BigTIFF, IFD or value offsets pointing into the
//! header, an IFD reached twice, more than `max_ifds` directories. A directory, entry
//! table or value that lies past the buffered bytes is reported as truncation at the end
//! of the stream.
//!
//! Policy violations: tags out of order, repeated tags, unexpected field types, odd
//! offsets, missing required image tags, strip/tile count mismatches, image data past
//! the end of the file. Unknown field types only produce an info message.
//!
//! References:
//! - https://www.itu.int/itudoc/itu-t/com16/tiff-fx/docs/tiff6.pdf
//! - https://www.cipa.jp/std/documents/e/DC-008-2012_E.pdf

mod ifd;
mod tags;

pub mod analyzer;

pub use analyzer::{validate_tiff, IfdKind, TiffGrammar};
pub use ifd::{read_ifd0_summary, read_tiff_header, Ifd0Summary, IfdEntry, TIFF_MAGIC};

/// True when `data` starts with a classic TIFF header in either byte order.
#[inline]
pub fn is_tiff(data: &[u8]) -> bool {
    data.starts_with(b"II*\x00") || data.starts_with(b"MM\x00*")
}
