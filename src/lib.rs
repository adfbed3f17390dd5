//! # wellformed
//!
//! Streaming well-formedness and validity checks for self-describing binary containers.
//!
//! Every format is a preamble followed by a sequence of units (chunks, segments,
//! blocks, directory entries). One [`driver`] walks the units through a per-format
//! [`Grammar`](driver::Grammar); per-unit handlers decode payloads, record policy
//! violations and fill the metadata accumulator. A parse yields a [`RepInfo`] with two
//! independent verdicts:
//!
//! - **well-formed**: the byte stream obeys the container grammar. A structural fault
//!   stops the parse.
//! - **valid**: well-formed and every semantic rule holds. Policy violations are
//!   collected and the parse goes on.
//!
//! ## Supported formats
//!
//! - **PNG** with APNG chunks, CRC-checked.
//! - **JPEG** with JFIF, Exif (through the TIFF IFD reader), ICC and Adobe APPn.
//! - **GIF** 87a and 89a.
//! - **TIFF** baseline, TIFF/EP and DNG profiles; Exif, GPS and Interoperability IFDs.
//! - **WAVE** (RIFF) including Broadcast Wave.
//!
//! ## Example
//!
//! ```no_run
//! use wellformed::{validate_bytes, ParseOptions, Tristate};
//!
//! let bytes = std::fs::read("photo.png").unwrap();
//! let info = validate_bytes(&bytes, &ParseOptions::default());
//! if info.well_formed == Tristate::True && info.valid == Tristate::False {
//!     for m in &info.messages {
//!         println!("{} at {:?}: {}", m.id, m.offset, m.text);
//!     }
//! }
//! ```
//!
//! ## Throughput
//!
//! - Parsing streams through [`std::io::Read`]; only TIFF buffers the whole input
//!   because IFDs are reached by offset.
//! - All parse state lives in the call, so documents can be validated concurrently.
//!   The `parallel` feature runs [`validate_batch`] on a `rayon` pool.

pub mod cursor;
pub mod driver;
mod error;
mod metadata;
mod options;
mod property;
mod result;
mod text;
pub mod unit;

pub mod gif;
pub mod jpeg;
pub mod png;
pub mod tiff;
pub mod wave;

use std::io::{BufReader, Read};

pub use error::StructuralFault;
pub use gif::validate_gif;
pub use jpeg::validate_jpeg;
pub use metadata::{AudioMetadata, ImageMetadata, Rank, Resolution, Slot};
pub use options::ParseOptions;
pub use png::validate_png;
pub use property::{Property, PropertyKind, PropertyValue, Value};
pub use result::{Checksum, Message, RepInfo, Severity, Tristate};
pub use tiff::validate_tiff;
pub use wave::validate_wave;

/// Static identification data for one format module.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Descriptor {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
    /// Magic byte sequences at offset 0.
    pub signatures: &'static [&'static [u8]],
}

const PNG: Descriptor = Descriptor {
    name: "PNG",
    extensions: &["png", "apng"],
    mime_types: &["image/png", "image/apng"],
    signatures: &[&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]],
};

const JPEG: Descriptor = Descriptor {
    name: "JPEG",
    extensions: &["jpg", "jpeg", "jpe", "jfif"],
    mime_types: &["image/jpeg"],
    signatures: &[&[0xFF, 0xD8, 0xFF]],
};

const GIF: Descriptor = Descriptor {
    name: "GIF",
    extensions: &["gif"],
    mime_types: &["image/gif"],
    signatures: &[b"GIF87a", b"GIF89a"],
};

const TIFF: Descriptor = Descriptor {
    name: "TIFF",
    extensions: &["tif", "tiff", "dng"],
    mime_types: &["image/tiff", "image/x-adobe-dng"],
    signatures: &[b"II*\x00", b"MM\x00*"],
};

const WAVE: Descriptor = Descriptor {
    name: "WAVE",
    extensions: &["wav", "wave", "bwf"],
    mime_types: &["audio/vnd.wave", "audio/wav", "audio/x-wav"],
    signatures: &[b"RIFF"],
};

/// File type for routing, detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileType {
    Png,
    Jpeg,
    Gif,
    Tiff,
    Wave,
    Unknown,
}

impl FileType {
    /// Every type with a format module.
    pub const ALL: [FileType; 5] = [
        FileType::Png,
        FileType::Jpeg,
        FileType::Gif,
        FileType::Tiff,
        FileType::Wave,
    ];

    pub fn descriptor(self) -> Option<&'static Descriptor> {
        match self {
            FileType::Png => Some(&PNG),
            FileType::Jpeg => Some(&JPEG),
            FileType::Gif => Some(&GIF),
            FileType::Tiff => Some(&TIFF),
            FileType::Wave => Some(&WAVE),
            FileType::Unknown => None,
        }
    }

    /// Preferred extension for this type; `None` for Unknown.
    pub fn extension(self) -> Option<&'static str> {
        self.descriptor().and_then(|d| d.extensions.first().copied())
    }

    /// Short label for display.
    pub fn label(self) -> &'static str {
        self.descriptor().map_or("unknown", |d| d.name)
    }

    /// Type registered for a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> FileType {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.descriptor().is_some_and(|d| d.extensions.contains(&ext.as_str())))
            .unwrap_or(FileType::Unknown)
    }
}

/// Detect file type from magic bytes (no extension needed).
#[inline]
pub fn detect_file_type(data: &[u8]) -> FileType {
    if png::is_png(data) {
        return FileType::Png;
    }
    if jpeg::is_jpeg(data) {
        return FileType::Jpeg;
    }
    if gif::is_gif(data) {
        return FileType::Gif;
    }
    if tiff::is_tiff(data) {
        return FileType::Tiff;
    }
    if wave::is_wave(data) {
        return FileType::Wave;
    }
    FileType::Unknown
}

/// Validate `reader` as `file_type`.
///
/// `Unknown` yields a [`RepInfo`] with both verdicts undetermined and an info message.
pub fn validate<R: Read>(file_type: FileType, reader: R, options: &ParseOptions) -> RepInfo {
    let reader = BufReader::new(reader);
    match file_type {
        FileType::Png => png::validate_png(reader, options),
        FileType::Jpeg => jpeg::validate_jpeg(reader, options),
        FileType::Gif => gif::validate_gif(reader, options),
        FileType::Tiff => tiff::validate_tiff(reader, options),
        FileType::Wave => wave::validate_wave(reader, options),
        FileType::Unknown => {
            let mut info = RepInfo::new("unknown");
            info.info("CORE-UNKNOWN-FORMAT", "no format module recognises the stream", None);
            info
        }
    }
}

/// Detect the type of an in-memory buffer and validate it.
pub fn validate_bytes(data: &[u8], options: &ParseOptions) -> RepInfo {
    validate(detect_file_type(data), data, options)
}

/// Result for one item in a batch (path or index + representation information).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchItem<T> {
    pub path_or_id: T,
    pub info: RepInfo,
}

/// Validate many buffers. With the `parallel` feature the items run on the global
/// `rayon` pool; the output keeps input order either way.
pub fn validate_batch<I, B>(items: I, options: &ParseOptions) -> Vec<BatchItem<B>>
where
    I: IntoIterator<Item = (B, Vec<u8>)>,
    B: Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        let items: Vec<(B, Vec<u8>)> = items.into_iter().collect();
        items
            .into_par_iter()
            .map(|(path_or_id, bytes)| BatchItem {
                path_or_id,
                info: validate_bytes(&bytes, options),
            })
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items
            .into_iter()
            .map(|(path_or_id, bytes)| BatchItem {
                path_or_id,
                info: validate_bytes(&bytes, options),
            })
            .collect()
    }
}
