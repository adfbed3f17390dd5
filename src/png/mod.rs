//! PNG validator (PNG 1.2 / ISO 15948, with the APNG extension).
//!
//! Chunks are `length (u32 BE) | type (4 letters) | payload | CRC-32`. The CRC covers the
//! type and payload.
//!
//! Structural faults (not well-formed): bad signature, oversized length, non-letter type,
//! first chunk not IHDR, duplicate critical chunk, invalid IHDR fields, PLTE after IDAT
//! or with a bad length, IEND before any IDAT, CRC mismatch.
//!
//! Everything else (ordering of ancillary chunks, duplicate ancillary chunks, field
//! ranges, APNG sequencing, unknown critical chunks) is a policy violation.
//!
//! References:
//! - https://www.w3.org/TR/png-3/
//! - https://wiki.mozilla.org/APNG_Specification

mod chunks;
mod parser;

pub mod analyzer;

pub use analyzer::{validate_png, PngGrammar};
pub use chunks::{ChunkKind, CHUNK_TABLE, PNG_SIGNATURE};
pub use parser::Ihdr;

/// True when `data` starts with the PNG signature.
#[inline]
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}
