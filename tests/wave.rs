//! RIFF WAVE chunk grammar, fmt checks and Broadcast Wave tests.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use wellformed::{validate_bytes, validate_wave, ParseOptions, Property, RepInfo, Tristate, Value};

fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn fmt_payload(tag: u16, channels: u16, rate: u32, byte_rate: u32, block_align: u16, bits: u16) -> Vec<u8> {
    let mut p = tag.to_le_bytes().to_vec();
    p.extend_from_slice(&channels.to_le_bytes());
    p.extend_from_slice(&rate.to_le_bytes());
    p.extend_from_slice(&byte_rate.to_le_bytes());
    p.extend_from_slice(&block_align.to_le_bytes());
    p.extend_from_slice(&bits.to_le_bytes());
    p
}

/// 8 kHz mono 8-bit PCM.
fn pcm_fmt() -> Vec<u8> {
    chunk(b"fmt ", &fmt_payload(1, 1, 8000, 8000, 1, 8))
}

const SAMPLES: [u8; 8] = [0x80; 8];

fn data() -> Vec<u8> {
    chunk(b"data", &SAMPLES)
}

fn wave(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(&body);
    out
}

fn run(data: &[u8]) -> RepInfo {
    validate_wave(data, &ParseOptions::default())
}

fn ids(info: &RepInfo) -> Vec<&str> {
    info.messages.iter().map(|m| m.id.as_str()).collect()
}

fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut out = text.as_bytes().to_vec();
    out.resize(len, 0);
    out
}

#[test]
fn minimal_document_is_valid() {
    let bytes = wave(&[pcm_fmt(), data()]);
    let info = run(&bytes);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::True);
    assert!(info.messages.is_empty());
    assert_eq!(info.size, Some(bytes.len() as u64));
    assert_eq!(info.mime_type.as_deref(), Some("audio/vnd.wave"));
    assert_eq!(info.profiles, vec!["PCMWAVEFORMAT"]);
    assert_eq!(
        info.properties,
        vec![
            Property::nested(
                "WAVEMetadata",
                vec![
                    Property::nested("Format", vec![Property::scalar("FormatTag", 1u16)]),
                    Property::scalar("DataBytes", SAMPLES.len() as u64),
                ],
            ),
            Property::nested(
                "AudioMetadata",
                vec![
                    Property::scalar("AudioFormat", "PCM"),
                    Property::scalar("SampleRate", 8000u32),
                    Property::scalar("Channels", 1u16),
                    Property::scalar("BitsPerSample", 8u16),
                    Property::scalar("BlockAlign", 1u16),
                    Property::scalar("ByteRate", 8000u32),
                    Property::scalar("SampleCount", 8u64),
                    Property::scalar("DurationMillis", 1u64),
                ],
            ),
        ]
    );
}

#[test]
fn detection_records_the_signature() {
    let info = validate_bytes(&wave(&[pcm_fmt(), data()]), &ParseOptions::default());
    assert_eq!(info.format, "WAVE");
    assert_eq!(info.matched_signatures, vec!["WAVE"]);
}

#[test]
fn results_are_deterministic() {
    let bytes = wave(&[pcm_fmt(), chunk(b"JUNK", &[1, 2, 3]), data()]);
    assert_eq!(format!("{:?}", run(&bytes)), format!("{:?}", run(&bytes)));
}

#[test]
fn truncation_at_every_chunk_boundary() {
    let chunks = [pcm_fmt(), data()];
    let bytes = wave(&chunks);
    let mut cut = 12;
    for c in &chunks {
        let info = run(&bytes[..cut]);
        assert_eq!(info.well_formed, Tristate::False, "cut at {}", cut);
        assert_eq!(info.messages[0].id, "CORE-TRUNCATED");
        assert_eq!(info.messages[0].offset, Some(cut as u64));
        cut += c.len();
    }
}

#[test]
fn bad_form_type() {
    let mut bytes = wave(&[pcm_fmt(), data()]);
    bytes[8..12].copy_from_slice(b"AVI ");
    let info = run(&bytes);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["CORE-SIGNATURE"]);
}

#[test]
fn riff_size_too_small() {
    let mut bytes = wave(&[pcm_fmt(), data()]);
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    let info = run(&bytes);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-RIFF-SIZE"]);
}

#[test]
fn chunk_past_the_riff_extent() {
    let mut bytes = wave(&[pcm_fmt(), data()]);
    let data_len_at = 12 + pcm_fmt().len() + 4;
    bytes[data_len_at..data_len_at + 4].copy_from_slice(&100u32.to_le_bytes());
    let info = run(&bytes);
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-CHUNK-EXTENT"]);
    assert_eq!(info.messages[0].offset, Some((12 + pcm_fmt().len()) as u64));
}

#[test]
fn duplicate_fmt_is_structural() {
    let info = run(&wave(&[pcm_fmt(), pcm_fmt(), data()]));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-DUPLICATE-CHUNK"]);
    assert_eq!(info.messages[0].offset, Some((12 + pcm_fmt().len()) as u64));
}

#[test]
fn duplicate_data_is_policy() {
    let bytes = wave(&[pcm_fmt(), data(), data()]);
    let info = run(&bytes);
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(info.size, Some(bytes.len() as u64));
    assert_eq!(ids(&info), vec!["WAVE-DUPLICATE-CHUNK"]);
}

#[test]
fn missing_fmt_is_structural() {
    let info = run(&wave(&[data()]));
    assert_eq!(info.well_formed, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-DATA-BEFORE-FMT", "WAVE-NO-FMT"]);
    // Whatever was read is still reported.
    let meta = info.property("WAVEMetadata").unwrap();
    assert_eq!(meta.child("DataBytes"), Some(&Property::scalar("DataBytes", 8u64)));
}

#[test]
fn data_before_fmt_is_policy() {
    let info = run(&wave(&[data(), pcm_fmt()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-DATA-BEFORE-FMT"]);
}

#[test]
fn missing_data_is_policy() {
    let info = run(&wave(&[pcm_fmt()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(info.valid, Tristate::False);
    assert_eq!(ids(&info), vec!["WAVE-NO-DATA"]);
}

#[test]
fn pcm_block_align_and_byte_rate() {
    let bad_align = chunk(b"fmt ", &fmt_payload(1, 1, 8000, 16000, 2, 8));
    let info = run(&wave(&[bad_align, data()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["WAVE-BLOCK-ALIGN"]);

    let bad_rate = chunk(b"fmt ", &fmt_payload(1, 1, 8000, 4000, 1, 8));
    let info = run(&wave(&[bad_rate, data()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["WAVE-BYTE-RATE"]);
}

#[test]
fn compressed_audio_needs_fact() {
    let float = chunk(b"fmt ", &fmt_payload(3, 1, 8000, 32000, 4, 32));
    let info = run(&wave(&[float.clone(), data()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["WAVE-NO-FACT"]);

    let fact = chunk(b"fact", &5u32.to_le_bytes());
    let info = run(&wave(&[float, fact, data()]));
    assert_eq!(info.valid, Tristate::True);
    let audio = info.property("AudioMetadata").unwrap();
    assert_eq!(audio.child("AudioFormat"), Some(&Property::scalar("AudioFormat", "IEEE float")));
    // The fact chunk outranks the count derived from the data length.
    assert_eq!(audio.child("SampleCount"), Some(&Property::scalar("SampleCount", 5u64)));
}

#[test]
fn extensible_format_uses_the_sub_format() {
    let mut p = fmt_payload(0xFFFE, 2, 44100, 44100 * 4, 4, 16);
    p.extend_from_slice(&22u16.to_le_bytes());
    p.extend_from_slice(&16u16.to_le_bytes());
    p.extend_from_slice(&3u32.to_le_bytes());
    p.extend_from_slice(&[
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
    ]);
    let info = run(&wave(&[chunk(b"fmt ", &p), data()]));
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.profiles, vec!["WAVEFORMATEXTENSIBLE"]);
    let meta = info.property("WAVEMetadata").unwrap();
    assert_eq!(
        meta.child("Format"),
        Some(&Property::nested(
            "Format",
            vec![
                Property::scalar("FormatTag", 0xFFFEu16),
                Property::scalar("ValidBitsPerSample", 16u16),
                Property::scalar("ChannelMask", 3u32),
                Property::scalar("SubFormat", "PCM"),
            ],
        ))
    );
    let audio = info.property("AudioMetadata").unwrap();
    assert_eq!(audio.child("AudioFormat"), Some(&Property::scalar("AudioFormat", "PCM")));
}

#[test]
fn extension_size_past_the_chunk() {
    let mut p = fmt_payload(1, 1, 8000, 8000, 1, 8);
    p.extend_from_slice(&40u16.to_le_bytes());
    let info = run(&wave(&[chunk(b"fmt ", &p), data()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["WAVE-FMT-EXTENSION"]);
    assert_eq!(info.profiles, vec!["WAVEFORMATEX"]);
}

#[test]
fn unknown_chunk_adds_no_properties() {
    let plain = run(&wave(&[pcm_fmt(), data()]));
    let bytes = wave(&[pcm_fmt(), chunk(b"JUNK", &[1, 2, 3]), data()]);
    let info = run(&bytes);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(bytes.len() as u64));
    assert_eq!(ids(&info), vec!["WAVE-UNKNOWN-CHUNK"]);
    assert_eq!(info.messages[0].text, "JUNK chunk skipped");
    assert_eq!(info.properties, plain.properties);
}

#[test]
fn last_chunk_without_pad_byte() {
    let mut odd = b"data".to_vec();
    odd.extend_from_slice(&3u32.to_le_bytes());
    odd.extend_from_slice(&[0x80; 3]);
    let bytes = wave(&[pcm_fmt(), odd]);
    let info = run(&bytes);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(bytes.len() as u64));
    assert_eq!(ids(&info), vec!["WAVE-PAD-MISSING"]);
}

#[test]
fn bytes_after_the_riff_extent() {
    let mut bytes = wave(&[pcm_fmt(), data()]);
    let len = bytes.len() as u64;
    bytes.extend_from_slice(b"tail");
    let info = run(&bytes);
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.size, Some(len));
    assert_eq!(ids(&info), vec!["CORE-TRAILING-DATA"]);
}

#[test]
fn info_list_becomes_a_map() {
    let mut list = b"INFO".to_vec();
    list.extend_from_slice(&chunk(b"INAM", b"Song\0"));
    list.extend_from_slice(&chunk(b"ISFT", b"abc\0"));
    let info = run(&wave(&[pcm_fmt(), chunk(b"LIST", &list), data()]));
    assert_eq!(info.valid, Tristate::True);
    let mut expected = IndexMap::new();
    expected.insert("INAM".to_string(), Value::from("Song"));
    expected.insert("ISFT".to_string(), Value::from("abc"));
    let meta = info.property("WAVEMetadata").unwrap();
    assert_eq!(meta.child("Info"), Some(&Property::map("Info", expected)));
}

#[test]
fn broadcast_extension() {
    let mut bext = padded("Interview", 256);
    bext.extend(padded("Recorder", 32));
    bext.extend(padded("REF-1", 32));
    bext.extend_from_slice(b"2024-01-01");
    bext.extend_from_slice(b"12:00:00");
    bext.extend_from_slice(&0u64.to_le_bytes());
    bext.extend_from_slice(&1u16.to_le_bytes());
    bext.resize(602, 0);
    let info = run(&wave(&[chunk(b"bext", &bext), pcm_fmt(), data()]));
    assert_eq!(info.valid, Tristate::True);
    assert_eq!(info.profiles, vec!["PCMWAVEFORMAT", "Broadcast Wave Version 1"]);
    let meta = info.property("WAVEMetadata").unwrap();
    assert_eq!(
        meta.child("BroadcastExtension"),
        Some(&Property::nested(
            "BroadcastExtension",
            vec![
                Property::scalar("Description", "Interview"),
                Property::scalar("Originator", "Recorder"),
                Property::scalar("OriginatorReference", "REF-1"),
                Property::scalar("OriginationDate", "2024-01-01"),
                Property::scalar("OriginationTime", "12:00:00"),
                Property::scalar("TimeReference", 0u64),
                Property::scalar("Version", 1u16),
            ],
        ))
    );
}

#[test]
fn cue_count_must_fit() {
    let mut cue = 3u32.to_le_bytes().to_vec();
    cue.extend_from_slice(&[0; 24]);
    let info = run(&wave(&[pcm_fmt(), chunk(b"cue ", &cue), data()]));
    assert_eq!(info.well_formed, Tristate::True);
    assert_eq!(ids(&info), vec!["WAVE-CUE-LENGTH"]);
}
