//! PNG grammar, chunk rules and property tree tests.

use pretty_assertions::assert_eq;
use wellformed::{validate_bytes, validate_png, ParseOptions, Property, Tristate, Value};

const SIG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(data);
    let mut covered = tag.to_vec();
    covered.extend_from_slice(data);
    out.extend_from_slice(&crc32fast::hash(&covered).to_be_bytes());
    out
}

fn ihdr(width: u32, height: u32, depth: u8, color_type: u8) -> Vec<u8> {
    let mut d = width.to_be_bytes().to_vec();
    d.extend_from_slice(&height.to_be_bytes());
    d.extend_from_slice(&[depth, color_type, 0, 0, 0]);
    chunk(b"IHDR", &d)
}

const IDAT_DATA: &[u8] = &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01];

fn png(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = SIG.to_vec();
    for c in chunks {
        out.extend_from_slice(c);
    }
    out
}

fn minimal_chunks() -> Vec<Vec<u8>> {
    vec![ihdr(1, 1, 8, 0), chunk(b"IDAT", IDAT_DATA), chunk(b"IEND", &[])]
}

fn run(data: &[u8]) -> wellformed::RepInfo {
    validate_png(data, &ParseOptions::default())
}

#[test]
fn minimal_document_is_valid() {
    let data = png(&minimal_chunks());
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(data.len() as u64));
    assert_eq!(info.mime_type.as_deref(), Some("image/png"));
    assert_eq!(info.version.as_deref(), Some("1.2"));
    assert!(info.messages.is_empty());
    assert_eq!(
        info.properties,
        vec![
            Property::nested(
                "PNGMetadata",
                vec![
                    Property::nested(
                        "IHDR",
                        vec![
                            Property::scalar("Width", 1u32),
                            Property::scalar("Height", 1u32),
                            Property::scalar("BitDepth", 8u8),
                            Property::scalar("ColorType", "Greyscale"),
                            Property::scalar("Interlace", "None"),
                        ],
                    ),
                    Property::scalar("CompressedDataBytes", Value::Uint(IDAT_DATA.len() as u64)),
                ],
            ),
            Property::nested(
                "ImageMetadata",
                vec![
                    Property::scalar("ImageWidth", 1u32),
                    Property::scalar("ImageHeight", 1u32),
                    Property::scalar("BitsPerSample", "8"),
                    Property::scalar("SamplesPerPixel", 1u16),
                    Property::scalar("ColorSpace", "Greyscale"),
                    Property::scalar("Compression", "Deflate"),
                ],
            ),
        ]
    );
}

#[test]
fn digests_cover_the_whole_stream() {
    let data = png(&minimal_chunks());
    let info = run(&data);
    let crc = info.checksums.iter().find(|c| c.algorithm == "CRC32").unwrap();
    assert_eq!(crc.value, format!("{:08x}", crc32fast::hash(&data)));
    let quiet = validate_png(&data[..], &ParseOptions::default().compute_digests(false));
    assert!(quiet.checksums.is_empty());
}

#[test]
fn detection_records_the_signature() {
    let info = validate_bytes(&png(&minimal_chunks()), &ParseOptions::default());
    assert_eq!(info.format, "PNG");
    assert_eq!(info.matched_signatures, vec!["PNG"]);
}

#[test]
fn results_are_deterministic() {
    let mut chunks = minimal_chunks();
    chunks.insert(1, chunk(b"tEXt", b"Title\0hello"));
    chunks.insert(1, chunk(b"gAMA", &0u32.to_be_bytes()));
    let data = png(&chunks);
    let a = run(&data);
    let b = run(&data);
    assert_eq!(format!("{:?}", a), format!("{:?}", b));
}

#[test]
fn truncation_at_every_chunk_boundary() {
    let chunks = minimal_chunks();
    let data = png(&chunks);
    let mut boundary = SIG.len();
    for c in &chunks {
        let info = run(&data[..boundary]);
        assert_eq!(info.well_formed, Tristate::False, "cut at {}", boundary);
        assert_eq!(info.valid, Tristate::False);
        assert_eq!(info.messages[0].id, "CORE-TRUNCATED");
        assert_eq!(info.messages[0].offset, Some(boundary as u64));
        assert!(info.size.is_none());
        boundary += c.len();
    }
}

#[test]
fn bad_signature() {
    let mut data = png(&minimal_chunks());
    data[1] = b'Q';
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "CORE-SIGNATURE");
    assert!(info.properties.is_empty());
}

#[test]
fn crc_mismatch_is_structural() {
    let mut data = png(&minimal_chunks());
    // Last byte of the IHDR payload.
    data[8 + 8 + 12] ^= 0x01;
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "CORE-CHECKSUM");
    assert_eq!(info.messages[0].offset, Some(8));
}

#[test]
fn ihdr_must_come_first() {
    let data = png(&[chunk(b"IDAT", IDAT_DATA), ihdr(1, 1, 8, 0), chunk(b"IEND", &[])]);
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-IHDR-FIRST");
}

#[test]
fn duplicate_critical_chunk_is_structural() {
    let mut chunks = minimal_chunks();
    chunks.insert(1, ihdr(1, 1, 8, 0));
    let info = run(&png(&chunks));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-DUPLICATE-CHUNK");
    assert_eq!(info.messages[0].offset, Some(33));
}

#[test]
fn duplicate_ancillary_chunk_is_policy() {
    let gama = chunk(b"gAMA", &45455u32.to_be_bytes());
    let mut chunks = minimal_chunks();
    chunks.insert(1, gama.clone());
    chunks.insert(1, gama);
    let data = png(&chunks);
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(info.size, Some(data.len() as u64));
    let ids: Vec<&str> = info.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["PNG-DUPLICATE-CHUNK"]);
}

#[test]
fn unknown_ancillary_chunk_is_tolerated() {
    let mut chunks = minimal_chunks();
    chunks.insert(1, chunk(b"prVt", b"anything at all"));
    let data = png(&chunks);
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(data.len() as u64));
    assert_eq!(info.messages[0].id, "PNG-UNKNOWN-ANCILLARY");
}

#[test]
fn unknown_critical_chunk_is_a_policy_violation() {
    let mut chunks = minimal_chunks();
    chunks.insert(1, chunk(b"ABCD", &[1, 2, 3]));
    let info = run(&png(&chunks));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-UNKNOWN-CRITICAL");
}

#[test]
fn iend_without_idat() {
    let info = run(&png(&[ihdr(1, 1, 8, 0), chunk(b"IEND", &[])]));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-NO-IDAT");
}

#[test]
fn plte_after_idat_is_structural() {
    let mut chunks = minimal_chunks();
    chunks.insert(2, chunk(b"PLTE", &[0, 0, 0]));
    let info = run(&png(&chunks));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-PLTE-AFTER-IDAT");
}

#[test]
fn invalid_bit_depth_is_structural() {
    let info = run(&png(&[ihdr(1, 1, 3, 2), chunk(b"IDAT", IDAT_DATA), chunk(b"IEND", &[])]));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-IHDR-BIT-DEPTH");
}

#[test]
fn gama_after_idat_is_out_of_order() {
    let mut chunks = minimal_chunks();
    chunks.insert(2, chunk(b"gAMA", &45455u32.to_be_bytes()));
    let info = run(&png(&chunks));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-CHUNK-ORDER");
}

#[test]
fn phys_sets_specific_resolution() {
    let mut phys = 2835u32.to_be_bytes().to_vec();
    phys.extend_from_slice(&2835u32.to_be_bytes());
    phys.push(1);
    let mut chunks = minimal_chunks();
    chunks.insert(1, chunk(b"pHYs", &phys));
    let info = run(&png(&chunks));
    assert_eq!(info.valid, Tristate::True);
    let image = info.property("ImageMetadata").unwrap();
    assert_eq!(image.child("XResolution"), Some(&Property::rational("XResolution", 2835, 1)));
    assert_eq!(image.child("ResolutionUnit"), Some(&Property::scalar("ResolutionUnit", "meter")));
}

#[test]
fn text_chunks_become_groups() {
    let mut chunks = minimal_chunks();
    chunks.insert(1, chunk(b"tEXt", b"Author\0Somebody"));
    let info = run(&png(&chunks));
    let png_meta = info.property("PNGMetadata").unwrap();
    assert_eq!(
        png_meta.child("TextualData"),
        Some(&Property::group_list(
            "TextualData",
            vec![vec![
                Property::scalar("Keyword", "Author"),
                Property::scalar("Text", "Somebody"),
            ]],
        ))
    );
}

#[test]
fn trailing_bytes_are_not_counted() {
    let mut data = png(&minimal_chunks());
    let len = data.len() as u64;
    data.extend_from_slice(b"junk");
    let info = run(&data);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(len));
    assert_eq!(info.messages[0].id, "CORE-TRAILING-DATA");
}

#[test]
fn chunk_length_over_limit() {
    let mut data = SIG.to_vec();
    data.extend_from_slice(&0x8000_0000u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    let info = run(&data);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(info.messages[0].id, "PNG-CHUNK-LENGTH");
}
