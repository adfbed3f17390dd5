//! RIFF WAVE validator, Broadcast Wave included.
//!
//! Structural faults: missing `RIFF`/`WAVE` magic, a RIFF size below 4, a chunk whose
//! payload runs past the RIFF extent, a second fmt chunk, fixed chunk parts shorter than
//! required, end of stream inside the RIFF extent, and a file without a fmt chunk.
//!
//! Policy violations: data before fmt, no data chunk, compressed audio without fact,
//! repeated data/fact/cue/bext/smpl/inst chunks, PCM block align or byte rate that
//! disagree with the other fmt fields, an fmt extension larger than the chunk, and
//! cue, smpl or INFO contents that do not fit their chunk. Unknown chunks and a missing
//! final pad byte produce info messages.
//!
//! Reference: https://www.mmsp.ece.mcgill.ca/Documents/AudioFormats/WAVE/WAVE.html

mod chunks;
mod parser;

pub mod analyzer;

pub use analyzer::{validate_wave, WaveGrammar};
pub use chunks::{format_name, ChunkKind, CHUNK_TABLE};
pub use parser::FmtLayout;

/// True when `data` starts with a RIFF header of form type WAVE.
#[inline]
pub fn is_wave(data: &[u8]) -> bool {
    data.len() >= 12 && data[..4] == chunks::RIFF && data[8..12] == chunks::WAVE
}
