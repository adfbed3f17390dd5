//! JPEG validator (ITU T.81 interchange format with JFIF, Exif, ICC and Adobe APPn).
//!
//! Structural faults: missing SOI, a byte other than `FF` where a marker is due, `FF00`
//! between segments, a second SOI, segment lengths below 2, frame or scan headers whose
//! length does not match their component count, malformed DHT or DQT tables, segments
//! shorter than their fixed fields, and end of stream before EOI (including inside
//! entropy-coded data).
//!
//! Policy violations: sample precision outside what the coding process allows, zero
//! frame width, more than one frame outside a hierarchical file, SOS before any frame,
//! scan components missing from the frame, a DRI length other than 4, DNL before the
//! first scan, a JFIF APP0 that is not the first segment, an unreadable Exif body, RST
//! markers outside a scan, and images without a frame or a scan. JPGn and reserved
//! markers produce an info message and are skipped.
//!
//! Reference: https://www.w3.org/Graphics/JPEG/itu-t81.pdf

mod markers;
mod parser;

pub mod analyzer;

pub use analyzer::{validate_jpeg, JpegGrammar};
pub use markers::{process_name, SegmentKind, SEGMENT_TABLE};

/// True when `data` starts with SOI followed by another marker.
#[inline]
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0xFF && data[1] == markers::SOI && data[2] == 0xFF
}
