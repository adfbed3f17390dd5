//! TIFF directory walking, tag checks and profile recognition tests.

use pretty_assertions::assert_eq;
use wellformed::{validate_bytes, validate_tiff, ParseOptions, Property, PropertyValue, RepInfo, Tristate, Value};

const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;
const ASCII: u16 = 2;

/// Offset of IFD0 in every synthetic file; the 2 bytes before it hold the pixel data.
const IFD0: usize = 10;
const PIXELS_AT: u32 = 8;

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: Vec<u8>,
}

fn short(tag: u16, v: u16) -> Entry {
    Entry { tag, field_type: SHORT, count: 1, value: v.to_le_bytes().to_vec() }
}

fn long(tag: u16, v: u32) -> Entry {
    Entry { tag, field_type: LONG, count: 1, value: v.to_le_bytes().to_vec() }
}

fn rational(tag: u16, n: u32, d: u32) -> Entry {
    let mut value = n.to_le_bytes().to_vec();
    value.extend_from_slice(&d.to_le_bytes());
    Entry { tag, field_type: RATIONAL, count: 1, value }
}

fn ascii(tag: u16, s: &str) -> Entry {
    let mut value = s.as_bytes().to_vec();
    value.push(0);
    Entry { tag, field_type: ASCII, count: value.len() as u32, value }
}

/// One little-endian IFD placed at `at`; values longer than 4 bytes follow the table.
fn ifd(entries: &[Entry], at: usize, next: u32) -> Vec<u8> {
    let mut table = (entries.len() as u16).to_le_bytes().to_vec();
    let mut extra = Vec::new();
    let extra_at = at + 2 + entries.len() * 12 + 4;
    for e in entries {
        table.extend_from_slice(&e.tag.to_le_bytes());
        table.extend_from_slice(&e.field_type.to_le_bytes());
        table.extend_from_slice(&e.count.to_le_bytes());
        if e.value.len() <= 4 {
            let mut inline = e.value.clone();
            inline.resize(4, 0);
            table.extend_from_slice(&inline);
        } else {
            table.extend_from_slice(&((extra_at + extra.len()) as u32).to_le_bytes());
            extra.extend_from_slice(&e.value);
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
        }
    }
    table.extend_from_slice(&next.to_le_bytes());
    table.extend_from_slice(&extra);
    table
}

fn header(ifd0: u32) -> Vec<u8> {
    let mut out = b"II*\x00".to_vec();
    out.extend_from_slice(&ifd0.to_le_bytes());
    out
}

fn tiff(entries: &[Entry], next: u32) -> Vec<u8> {
    let mut out = header(IFD0 as u32);
    out.extend_from_slice(&[0x80, 0x00]);
    out.extend_from_slice(&ifd(entries, IFD0, next));
    out
}

/// 1x1 8-bit greyscale image, one strip, 72 dpi.
fn grayscale() -> Vec<Entry> {
    vec![
        short(256, 1),
        short(257, 1),
        short(258, 8),
        short(259, 1),
        short(262, 1),
        long(273, PIXELS_AT),
        short(277, 1),
        short(278, 1),
        long(279, 1),
        rational(282, 72, 1),
        rational(283, 72, 1),
        short(296, 2),
    ]
}

fn without(tag: u16) -> Vec<Entry> {
    grayscale().into_iter().filter(|e| e.tag != tag).collect()
}

fn run(data: &[u8]) -> RepInfo {
    validate_tiff(data, &ParseOptions::default())
}

fn ids(info: &RepInfo) -> Vec<&str> {
    info.messages.iter().map(|m| m.id.as_str()).collect()
}

fn ifd_groups(info: &RepInfo) -> Vec<Vec<Property>> {
    let ifds = info.property("TIFFMetadata").unwrap().child("IFDs").unwrap();
    let PropertyValue::List(groups) = &ifds.value else {
        panic!("IFDs is not a list");
    };
    groups
        .iter()
        .map(|g| match g {
            Value::Group(props) => props.clone(),
            other => panic!("unexpected IFD entry {:?}", other),
        })
        .collect()
}

#[test]
fn minimal_document_is_valid() {
    let data = tiff(&grayscale(), 0);
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::True);
    assert!(info.messages.is_empty());
    assert_eq!(info.size, Some(data.len() as u64));
    assert_eq!(info.mime_type.as_deref(), Some("image/tiff"));
    assert_eq!(info.version.as_deref(), Some("6.0"));
    assert_eq!(info.profiles, vec!["Baseline grayscale"]);
    assert_eq!(
        info.properties,
        vec![
            Property::nested(
                "TIFFMetadata",
                vec![
                    Property::scalar("ByteOrder", "little-endian"),
                    Property::scalar("IFDCount", 1u64),
                    Property::group_list(
                        "IFDs",
                        vec![vec![
                            Property::scalar("Offset", IFD0 as u32),
                            Property::scalar("Kind", "IFD0"),
                            Property::scalar("ImageWidth", 1u32),
                            Property::scalar("ImageLength", 1u32),
                            Property::scalar("BitsPerSample", 8u32),
                            Property::scalar("Compression", 1u32),
                            Property::scalar("PhotometricInterpretation", 1u32),
                            Property::scalar("StripOffsets", PIXELS_AT),
                            Property::scalar("SamplesPerPixel", 1u32),
                            Property::scalar("RowsPerStrip", 1u32),
                            Property::scalar("StripByteCounts", 1u32),
                            Property::rational("XResolution", 72, 1),
                            Property::rational("YResolution", 72, 1),
                            Property::scalar("ResolutionUnit", 2u32),
                        ]],
                    ),
                ],
            ),
            Property::nested(
                "ImageMetadata",
                vec![
                    Property::scalar("ImageWidth", 1u32),
                    Property::scalar("ImageHeight", 1u32),
                    Property::scalar("BitsPerSample", "8"),
                    Property::scalar("SamplesPerPixel", 1u16),
                    Property::scalar("ColorSpace", "BlackIsZero"),
                    Property::scalar("Compression", "Uncompressed"),
                    Property::rational("XResolution", 72, 1),
                    Property::rational("YResolution", 72, 1),
                    Property::scalar("ResolutionUnit", "inch"),
                ],
            ),
        ]
    );
}

#[test]
fn detection_records_the_signature() {
    let info = validate_bytes(&tiff(&grayscale(), 0), &ParseOptions::default());
    assert_eq!(info.format, "TIFF");
    assert_eq!(info.matched_signatures, vec!["TIFF"]);
}

#[test]
fn results_are_deterministic() {
    let data = tiff(&grayscale(), 0);
    assert_eq!(format!("{:?}", run(&data)), format!("{:?}", run(&data)));
}

#[test]
fn bad_byte_order_mark() {
    let mut data = tiff(&grayscale(), 0);
    data[0] = b'X';
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-SIGNATURE"]);
}

#[test]
fn bigtiff_is_reported_as_such() {
    let data = b"MM\x00\x2B\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00\x10".to_vec();
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-BIGTIFF"]);
}

#[test]
fn ifd0_offset_into_the_header() {
    let mut data = tiff(&grayscale(), 0);
    data[4..8].copy_from_slice(&0u32.to_le_bytes());
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-IFD-OFFSET"]);
    assert_eq!(info.messages[0].offset, Some(4));
}

#[test]
fn ifd0_offset_past_the_end_is_truncation() {
    let mut data = tiff(&grayscale(), 0);
    data[4..8].copy_from_slice(&10_000u32.to_le_bytes());
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-TRUNCATED"]);
    assert_eq!(info.messages[0].offset, Some(data.len() as u64));
}

#[test]
fn entry_table_past_the_end() {
    let data = tiff(&grayscale(), 0);
    let info = run(&data[..IFD0 + 60]);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-TRUNCATED"]);
    assert_eq!(info.messages[0].offset, Some((IFD0 + 60) as u64));
}

/// IFD0 with a grayscale image chained to a second page that lacks ImageLength.
fn two_pages() -> (Vec<u8>, usize) {
    let main_len = ifd(&grayscale(), IFD0, 0).len();
    let page_at = IFD0 + main_len;
    let mut data = tiff(&grayscale(), page_at as u32);
    data.extend_from_slice(&ifd(&without(257), page_at, 0));
    (data, page_at)
}

#[test]
fn truncation_at_every_directory_boundary() {
    let (data, page_at) = two_pages();
    let main_next = IFD0 + 2 + grayscale().len() * 12;
    let page_next = page_at + 2 + without(257).len() * 12;
    let cuts = [
        0,
        4,
        8,
        IFD0,
        IFD0 + 2 + 12,
        main_next,
        main_next + 4,
        page_at,
        page_at + 2 + 12,
        page_next,
    ];
    for cut in cuts {
        let info = run(&data[..cut]);
        assert_eq!(info.well_formed, Tristate::False, "cut at {}", cut);
        assert_eq!(info.messages[0].id, "CORE-TRUNCATED", "cut at {}", cut);
        assert_eq!(info.messages[0].offset, Some(cut as u64), "cut at {}", cut);
    }
    assert_eq!(run(&data).well_formed, Tristate::True);
}

#[test]
fn ifd_chain_cycle_is_structural() {
    let data = tiff(&grayscale(), IFD0 as u32);
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-IFD-CYCLE"]);
    assert_eq!(info.messages[0].offset, Some(IFD0 as u64));
    // The directory read before the cycle is still reported.
    assert_eq!(ifd_groups(&info).len(), 1);
    assert!(info.profiles.is_empty());
}

#[test]
fn value_offset_past_the_end_is_truncation() {
    let mut data = tiff(&grayscale(), 0);
    // XResolution is the tenth entry; its value offset is the entry's last four bytes.
    let entry_at = IFD0 + 2 + 9 * 12;
    data[entry_at + 8..entry_at + 12].copy_from_slice(&10_000u32.to_le_bytes());
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-TRUNCATED"]);
    assert_eq!(info.messages[0].offset, Some(data.len() as u64));
}

#[test]
fn value_offset_into_the_header() {
    let mut data = tiff(&grayscale(), 0);
    let entry_at = IFD0 + 2 + 9 * 12;
    data[entry_at + 8..entry_at + 12].copy_from_slice(&2u32.to_le_bytes());
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-VALUE-OFFSET"]);
    assert_eq!(info.messages[0].offset, Some(entry_at as u64));
}

#[test]
fn directory_limit() {
    let data = tiff(&grayscale(), 0);
    let info = validate_tiff(&data[..], &ParseOptions::default().max_ifds(0));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-ITERATION-LIMIT"]);
}

#[test]
fn buffer_limit() {
    let data = tiff(&grayscale(), 0);
    let info = validate_tiff(&data[..], &ParseOptions::default().max_buffered(16));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-ITERATION-LIMIT"]);
    assert!(info.matched_signatures.is_empty());
    let info = validate_tiff(&data[..], &ParseOptions::default().max_buffered(data.len() as u64));
    assert_eq!(info.well_formed, Tristate::True);
}

#[test]
fn unknown_tags_are_tolerated() {
    let mut entries = grayscale();
    entries.push(short(65000, 7));
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.valid, Tristate::True);
    assert!(info.messages.is_empty());
    assert_eq!(info.profiles, vec!["Baseline grayscale"]);
}

#[test]
fn unknown_field_type_is_informational() {
    let mut entries = grayscale();
    entries.push(Entry { tag: 65001, field_type: 99, count: 1, value: vec![0; 4] });
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(ids(&info), vec!["TIFF-UNKNOWN-TYPE"]);
}

#[test]
fn tags_out_of_order() {
    let mut entries = grayscale();
    entries.swap(0, 1);
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-TAG-ORDER"]);
    assert_eq!(info.messages[0].offset, Some((IFD0 + 2 + 12) as u64));
}

#[test]
fn repeated_tag() {
    let mut entries = grayscale();
    entries.insert(1, short(256, 2));
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["TIFF-DUPLICATE-TAG"]);
    let image = info.property("ImageMetadata").unwrap();
    assert_eq!(image.child("ImageWidth"), Some(&Property::scalar("ImageWidth", 1u32)));
}

#[test]
fn unexpected_field_type() {
    let mut entries = grayscale();
    entries[2] = long(258, 8);
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-TAG-TYPE"]);
}

#[test]
fn missing_photometric_interpretation() {
    let info = run(&tiff(&without(262), 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-MISSING-TAG"]);
    assert!(info.profiles.is_empty());
}

#[test]
fn strips_without_byte_counts() {
    let info = run(&tiff(&without(279), 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["TIFF-MISSING-TAG"]);
}

#[test]
fn strip_data_past_the_end() {
    let mut entries = grayscale();
    entries[8] = long(279, 4096);
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["TIFF-STRIP-BOUNDS"]);
}

#[test]
fn no_resolution_means_no_baseline_profile() {
    let entries: Vec<Entry> = grayscale().into_iter().filter(|e| e.tag != 282 && e.tag != 283).collect();
    let info = run(&tiff(&entries, 0));
    assert_eq!(info.valid, Tristate::True);
    assert!(info.profiles.is_empty());
}

#[test]
fn exif_directory_is_followed() {
    let exif_entries = [ascii(36867, "2024:01:01 00:00:00")];
    let with_pointer = |exif_at: u32| {
        let mut entries = grayscale();
        entries.push(long(34665, exif_at));
        entries
    };
    let main_len = ifd(&with_pointer(0), IFD0, 0).len();
    let exif_at = IFD0 + main_len;
    let mut data = tiff(&with_pointer(exif_at as u32), 0);
    data.extend_from_slice(&ifd(&exif_entries, exif_at, 0));

    let info = run(&data);
    assert_eq!(info.valid, Tristate::True);
    assert!(info.messages.is_empty());
    let groups = ifd_groups(&info);
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[1],
        vec![
            Property::scalar("Offset", exif_at as u32),
            Property::scalar("Kind", "Exif"),
            Property::scalar("DateTimeOriginal", "2024:01:01 00:00:00"),
        ]
    );
    let meta = info.property("TIFFMetadata").unwrap();
    assert_eq!(meta.child("IFDCount"), Some(&Property::scalar("IFDCount", 2u64)));
}

#[test]
fn second_page_is_checked_as_an_image() {
    let (data, _) = two_pages();

    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["TIFF-MISSING-TAG"]);
    assert_eq!(info.messages[0].text, "IFD1 lacks ImageLength");
    assert_eq!(info.profiles, vec!["Baseline grayscale"]);
}
