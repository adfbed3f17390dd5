//! GIF validator (GIF87a and GIF89a).
//!
//! Structural faults: bad signature, an unknown block introducer, a graphic control
//! extension whose block size is not 4, a fixed block part shorter than required, and
//! end of stream before the trailer.
//!
//! Policy violations: extensions in a GIF87a file, two graphic control extensions
//! before one graphic block, a graphic control extension left unused, reserved disposal
//! methods, images outside the logical screen, LZW code sizes outside 2..=8, images
//! without data, files without images. Unknown extensions produce an info message.
//!
//! Reference: https://www.w3.org/Graphics/GIF/spec-gif89a.txt

mod blocks;
mod parser;

pub mod analyzer;

pub use analyzer::{validate_gif, GifGrammar};
pub use blocks::{BlockKind, BLOCK_TABLE};
pub use parser::GifVersion;

/// True when `data` starts with a GIF87a or GIF89a signature.
#[inline]
pub fn is_gif(data: &[u8]) -> bool {
    data.starts_with(blocks::GIF87A) || data.starts_with(blocks::GIF89A)
}
