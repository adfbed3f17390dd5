//! JPEG marker codes (ITU T.81 Table B.1) and the segment table.

use crate::unit::{Category, Dispatcher, Tag, UnitSpec};

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const TEM: u8 = 0x01;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;

pub const SOF0: u8 = 0xC0;
pub const DHT: u8 = 0xC4;
pub const JPG: u8 = 0xC8;
pub const DAC: u8 = 0xCC;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DNL: u8 = 0xDC;
pub const DRI: u8 = 0xDD;
pub const DHP: u8 = 0xDE;
pub const EXP: u8 = 0xDF;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP2: u8 = 0xE2;
pub const APP14: u8 = 0xEE;
pub const APP15: u8 = 0xEF;
pub const COM: u8 = 0xFE;

/// Frame markers: SOF0-SOF15 minus DHT, JPG and DAC.
#[inline]
pub fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, DHT | JPG | DAC)
}

#[inline]
pub fn is_rst(marker: u8) -> bool {
    (RST0..=RST7).contains(&marker)
}

/// Markers that carry no length field.
#[inline]
pub fn is_standalone(marker: u8) -> bool {
    marker == SOI || marker == EOI || marker == TEM || is_rst(marker)
}

/// Coding process named by a frame marker.
pub fn process_name(marker: u8) -> &'static str {
    match marker {
        0xC0 => "Baseline DCT",
        0xC1 => "Extended sequential DCT",
        0xC2 => "Progressive DCT",
        0xC3 => "Lossless",
        0xC5 => "Differential sequential DCT",
        0xC6 => "Differential progressive DCT",
        0xC7 => "Differential lossless",
        0xC9 => "Extended sequential DCT, arithmetic",
        0xCA => "Progressive DCT, arithmetic",
        0xCB => "Lossless, arithmetic",
        0xCD => "Differential sequential DCT, arithmetic",
        0xCE => "Differential progressive DCT, arithmetic",
        0xCF => "Differential lossless, arithmetic",
        _ => "Unknown",
    }
}

/// Lossless processes allow sample precisions 2..=16.
#[inline]
pub fn is_lossless(marker: u8) -> bool {
    matches!(marker, 0xC3 | 0xC7 | 0xCB | 0xCF)
}

use Category::{Ancillary, Critical};

const fn seg(marker: u8, name: &'static str, category: Category, min_len: u64) -> UnitSpec {
    UnitSpec::new(marker as Tag, name, category, true, min_len)
}

/// Segment markers (those followed by a length). Minimums exclude the length field.
///
/// Every segment may repeat at this level; frame and restart-interval repetition is
/// judged by the handlers because hierarchical files legitimately repeat frames.
pub const SEGMENT_TABLE: &[UnitSpec] = &[
    seg(0xC0, "SOF0", Critical, 6),
    seg(0xC1, "SOF1", Critical, 6),
    seg(0xC2, "SOF2", Critical, 6),
    seg(0xC3, "SOF3", Critical, 6),
    seg(DHT, "DHT", Critical, 17),
    seg(0xC5, "SOF5", Critical, 6),
    seg(0xC6, "SOF6", Critical, 6),
    seg(0xC7, "SOF7", Critical, 6),
    seg(0xC9, "SOF9", Critical, 6),
    seg(0xCA, "SOF10", Critical, 6),
    seg(0xCB, "SOF11", Critical, 6),
    seg(DAC, "DAC", Critical, 2),
    seg(0xCD, "SOF13", Critical, 6),
    seg(0xCE, "SOF14", Critical, 6),
    seg(0xCF, "SOF15", Critical, 6),
    seg(SOS, "SOS", Critical, 6),
    seg(DQT, "DQT", Critical, 65),
    seg(DNL, "DNL", Critical, 2),
    seg(DRI, "DRI", Critical, 2),
    seg(DHP, "DHP", Critical, 6),
    seg(EXP, "EXP", Critical, 1),
    seg(0xE0, "APP0", Ancillary, 0),
    seg(0xE1, "APP1", Ancillary, 0),
    seg(0xE2, "APP2", Ancillary, 0),
    seg(0xE3, "APP3", Ancillary, 0),
    seg(0xE4, "APP4", Ancillary, 0),
    seg(0xE5, "APP5", Ancillary, 0),
    seg(0xE6, "APP6", Ancillary, 0),
    seg(0xE7, "APP7", Ancillary, 0),
    seg(0xE8, "APP8", Ancillary, 0),
    seg(0xE9, "APP9", Ancillary, 0),
    seg(0xEA, "APP10", Ancillary, 0),
    seg(0xEB, "APP11", Ancillary, 0),
    seg(0xEC, "APP12", Ancillary, 0),
    seg(0xED, "APP13", Ancillary, 0),
    seg(0xEE, "APP14", Ancillary, 0),
    seg(0xEF, "APP15", Ancillary, 0),
    seg(COM, "COM", Ancillary, 0),
];

/// JPGn and reserved markers carry a length and can be skipped.
fn unknown_category(_tag: Tag) -> Category {
    Ancillary
}

fn marker_name(tag: Tag) -> String {
    match tag as u8 {
        m @ 0xF0..=0xFD => format!("JPG{}", m - 0xF0),
        JPG => "JPG".to_string(),
        m => format!("0xFF{:02X}", m),
    }
}

pub const DISPATCH: Dispatcher = Dispatcher::new(SEGMENT_TABLE, unknown_category, marker_name);

/// Handler variant for a segment marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Sof(u8),
    Dht,
    Dac,
    Dqt,
    Dri,
    Sos,
    Dnl,
    Dhp,
    Exp,
    App0,
    App1,
    App2,
    App14,
    OtherApp,
    Com,
    Unknown,
}

impl SegmentKind {
    pub fn from_marker(marker: u8) -> Self {
        match marker {
            m if is_sof(m) => SegmentKind::Sof(m),
            DHT => SegmentKind::Dht,
            DAC => SegmentKind::Dac,
            DQT => SegmentKind::Dqt,
            DRI => SegmentKind::Dri,
            SOS => SegmentKind::Sos,
            DNL => SegmentKind::Dnl,
            DHP => SegmentKind::Dhp,
            EXP => SegmentKind::Exp,
            APP0 => SegmentKind::App0,
            APP1 => SegmentKind::App1,
            APP2 => SegmentKind::App2,
            APP14 => SegmentKind::App14,
            0xE3..=APP15 => SegmentKind::OtherApp,
            COM => SegmentKind::Com,
            _ => SegmentKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_frame_types() {
        assert_eq!((0u8..=0xFF).filter(|&m| is_sof(m)).count(), 13);
        assert!(!is_sof(DHT));
        assert!(is_lossless(0xC3));
    }

    #[test]
    fn table_matches_handlers() {
        assert_eq!(SEGMENT_TABLE.len(), 38);
        for spec in SEGMENT_TABLE {
            assert_ne!(SegmentKind::from_marker(spec.tag as u8), SegmentKind::Unknown, "{}", spec.name);
        }
        assert_eq!(SegmentKind::from_marker(0xF3), SegmentKind::Unknown);
        assert_eq!(DISPATCH.bind(0xF3, 0, 0, 4).name, "JPG3");
    }
}
