//! RIFF WAVE chunk identifiers and the static chunk table.

use crate::unit::{fourcc, fourcc_name, Category, Dispatcher, Tag, UnitSpec};

pub const RIFF: [u8; 4] = *b"RIFF";
pub const WAVE: [u8; 4] = *b"WAVE";

pub const FMT: Tag = fourcc(b"fmt ");
pub const DATA: Tag = fourcc(b"data");
pub const FACT: Tag = fourcc(b"fact");
pub const CUE: Tag = fourcc(b"cue ");
pub const LIST: Tag = fourcc(b"LIST");
pub const BEXT: Tag = fourcc(b"bext");
pub const SMPL: Tag = fourcc(b"smpl");
pub const INST: Tag = fourcc(b"inst");

/// LIST type holding text metadata sub-chunks.
pub const INFO: [u8; 4] = *b"INFO";

/// Chunk header: four-character id plus little-endian u32 length.
pub const CHUNK_HEADER_LEN: u64 = 8;

use Category::{Ancillary, Critical};

pub const CHUNK_TABLE: &[UnitSpec] = &[
    UnitSpec::new(FMT, "fmt ", Critical, false, 14),
    UnitSpec::new(DATA, "data", Critical, false, 0),
    UnitSpec::new(FACT, "fact", Ancillary, false, 4),
    UnitSpec::new(CUE, "cue ", Ancillary, false, 4),
    UnitSpec::new(LIST, "LIST", Ancillary, true, 4),
    UnitSpec::new(BEXT, "bext", Ancillary, false, 602),
    UnitSpec::new(SMPL, "smpl", Ancillary, false, 36),
    UnitSpec::new(INST, "inst", Ancillary, false, 7),
];

/// RIFF readers skip any chunk they do not know.
fn unknown_category(_tag: Tag) -> Category {
    Ancillary
}

pub const DISPATCH: Dispatcher = Dispatcher::new(CHUNK_TABLE, unknown_category, fourcc_name);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Fmt,
    Data,
    Fact,
    Cue,
    List,
    Bext,
    Smpl,
    Inst,
    Unknown,
}

impl ChunkKind {
    pub fn from_tag(tag: Tag) -> Self {
        match tag {
            FMT => ChunkKind::Fmt,
            DATA => ChunkKind::Data,
            FACT => ChunkKind::Fact,
            CUE => ChunkKind::Cue,
            LIST => ChunkKind::List,
            BEXT => ChunkKind::Bext,
            SMPL => ChunkKind::Smpl,
            INST => ChunkKind::Inst,
            _ => ChunkKind::Unknown,
        }
    }
}

/// WAVE_FORMAT_* codes from the Microsoft registry.
pub fn format_name(code: u16) -> &'static str {
    match code {
        0x0001 => "PCM",
        0x0002 => "Microsoft ADPCM",
        0x0003 => "IEEE float",
        0x0006 => "A-law",
        0x0007 => "mu-law",
        0x0011 => "IMA ADPCM",
        0x0031 => "GSM 6.10",
        0x0050 => "MPEG",
        0x0055 => "MPEG Layer 3",
        0xFFFE => "Extensible",
        _ => "Unknown",
    }
}
