//! Format-independent driver: header, unit loop, verdict aggregation.
//!
//! ```text
//! Start -> HeaderRead -> Streaming -> Terminal -> Done
//!                            |
//!                            +------> Error ----> Done
//! ```
//!
//! Structural faults from any stage move to `Error`; the driver turns them into
//! messages so nothing escapes to the caller. Policy violations are recorded by the
//! handlers themselves and never change the stage.

use std::io::Read;

use log::{debug, warn};

use crate::cursor::ChecksummingCursor;
use crate::error::StructuralFault;
use crate::options::ParseOptions;
use crate::result::{Checksum, RepInfo};
use crate::unit::{UnitOutcome, UnitResult};

/// One container format's grammar, driven by [`run`].
pub trait Grammar {
    /// Per-parse mutable state ("seen" flags, counters, metadata accumulator).
    type State;

    /// Format name reported in [`RepInfo::format`].
    const FORMAT: &'static str;

    /// Read and check the fixed preamble.
    fn read_header<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        info: &mut RepInfo,
        options: &ParseOptions,
    ) -> Result<Self::State, StructuralFault>;

    /// Read and handle exactly one unit.
    fn next_unit<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
        state: &mut Self::State,
        info: &mut RepInfo,
    ) -> UnitResult;

    /// Whole-document checks, profiles and the property tree.
    ///
    /// `completed` is false when the unit loop stopped on a structural fault; only
    /// the property tree should be attached then.
    fn finish(
        &self,
        state: Self::State,
        info: &mut RepInfo,
        completed: bool,
    ) -> Result<(), StructuralFault>;
}

/// Driver stage, for logging and control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    HeaderRead,
    Streaming,
    Terminal,
    Error,
    Done,
}

/// Parse one document with `grammar`. Never panics on malformed input and never
/// surfaces an I/O error: every failure ends up as a message on the returned [`RepInfo`].
pub fn run<G: Grammar, R: Read>(grammar: &G, reader: R, options: &ParseOptions) -> RepInfo {
    let mut info = RepInfo::new(G::FORMAT);
    let mut cursor = ChecksummingCursor::new(reader);
    if options.compute_digests {
        cursor = cursor.with_stream_digests();
    }

    let mut stage = Stage::Start;
    let mut state: Option<G::State> = None;
    let mut units = 0usize;

    loop {
        debug!("{}: stage {:?} at offset {}", G::FORMAT, stage, cursor.bytes_consumed());
        stage = match stage {
            Stage::Start => match grammar.read_header(&mut cursor, &mut info, options) {
                Ok(s) => {
                    info.add_signature(G::FORMAT);
                    state = Some(s);
                    Stage::HeaderRead
                }
                Err(fault) => {
                    warn!("{}: bad preamble: {}", G::FORMAT, fault);
                    info.structural(&fault);
                    // No signature and no metadata.
                    info.finalize();
                    return info;
                }
            },
            Stage::HeaderRead => Stage::Streaming,
            Stage::Streaming => {
                let Some(s) = state.as_mut() else {
                    break;
                };
                units += 1;
                if units > options.max_units {
                    let fault = StructuralFault::IterationLimit {
                        what: "units",
                        limit: options.max_units,
                        offset: cursor.bytes_consumed(),
                    };
                    info.structural(&fault);
                    Stage::Error
                } else {
                    match grammar.next_unit(&mut cursor, s, &mut info) {
                        Ok(UnitOutcome::Continue) => Stage::Streaming,
                        Ok(UnitOutcome::Terminal) => Stage::Terminal,
                        Err(fault) => {
                            warn!("{}: {} (offset {})", G::FORMAT, fault, fault.offset());
                            info.structural(&fault);
                            Stage::Error
                        }
                    }
                }
            }
            Stage::Terminal => {
                info.size = Some(cursor.bytes_consumed());
                match cursor.is_at_end() {
                    Ok(true) => {}
                    Ok(false) => {
                        let at = cursor.bytes_consumed();
                        info.info(
                            "CORE-TRAILING-DATA",
                            "data follows the terminal unit",
                            Some(at),
                        );
                        if options.compute_digests {
                            if let Err(fault) = cursor.skip_to_end() {
                                info.structural(&fault);
                            }
                        }
                    }
                    Err(fault) => info.structural(&fault),
                }
                if let Some(s) = state.take() {
                    if let Err(fault) = grammar.finish(s, &mut info, true) {
                        info.structural(&fault);
                    }
                }
                Stage::Done
            }
            Stage::Error => {
                if let Some(s) = state.take() {
                    // Only the first structural fault is reported.
                    if let Err(fault) = grammar.finish(s, &mut info, false) {
                        debug!("{}: finish after fault: {}", G::FORMAT, fault);
                    }
                }
                Stage::Done
            }
            Stage::Done => break,
        };
    }

    if let Some(d) = cursor.stream_digest() {
        if info.size.is_some() {
            info.checksums.push(Checksum {
                algorithm: "CRC32",
                value: d.crc32,
            });
            info.checksums.push(Checksum {
                algorithm: "SHA-256",
                value: d.sha256,
            });
        }
    }
    info.finalize();
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Endian;
    use crate::result::Tristate;

    /// Toy grammar: "TOY" magic, then (tag u8, len u16, payload) units; tag 0 ends.
    /// Tag 9 is a policy violation, tag 7 loops forever by declaring no payload.
    /// Finishing a broken document that has no complete unit fails.
    struct Toy;

    impl Grammar for Toy {
        type State = u32;
        const FORMAT: &'static str = "TOY";

        fn read_header<R: Read>(
            &self,
            cursor: &mut ChecksummingCursor<R>,
            _info: &mut RepInfo,
            _options: &ParseOptions,
        ) -> Result<u32, StructuralFault> {
            let magic = cursor.read_array::<3>()?;
            if &magic != b"TOY" {
                return Err(StructuralFault::BadSignature {
                    format: "TOY",
                    offset: 0,
                });
            }
            Ok(0)
        }

        fn next_unit<R: Read>(
            &self,
            cursor: &mut ChecksummingCursor<R>,
            state: &mut u32,
            info: &mut RepInfo,
        ) -> UnitResult {
            let at = cursor.bytes_consumed();
            let tag = cursor.read_u8()?;
            if tag == 0 {
                return Ok(UnitOutcome::Terminal);
            }
            let len = cursor.read_u16(Endian::Big)?;
            cursor.skip(u64::from(len))?;
            if tag == 9 {
                info.policy("TOY-NINE", "tag nine is discouraged", at);
            }
            *state += 1;
            Ok(UnitOutcome::Continue)
        }

        fn finish(&self, state: u32, info: &mut RepInfo, completed: bool) -> Result<(), StructuralFault> {
            if completed {
                info.add_profile(format!("{} units", state));
            } else if state == 0 {
                return Err(StructuralFault::malformed("TOY-EMPTY", 3, "no complete unit"));
            }
            Ok(())
        }
    }

    fn opts() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn minimal_document() {
        let data = b"TOY\x01\x00\x02ab\x00";
        let info = run(&Toy, &data[..], &opts());
        assert_eq!(info.well_formed, Tristate::True);
        assert_eq!(info.valid, Tristate::True);
        assert_eq!(info.size, Some(data.len() as u64));
        assert_eq!(info.profiles, vec!["1 units"]);
        assert_eq!(info.checksums.len(), 2);
    }

    #[test]
    fn bad_magic_stops_immediately() {
        let info = run(&Toy, &b"TOX\x00"[..], &opts());
        assert_eq!(info.well_formed, Tristate::False);
        assert!(info.size.is_none());
        assert!(info.profiles.is_empty());
        assert_eq!(info.messages[0].id, "CORE-SIGNATURE");
    }

    #[test]
    fn policy_violation_keeps_streaming() {
        let data = b"TOY\x09\x00\x00\x01\x00\x00\x00";
        let info = run(&Toy, &data[..], &opts());
        assert_eq!(info.well_formed, Tristate::True);
        assert_eq!(info.valid, Tristate::False);
        assert_eq!(info.profiles, vec!["2 units"]);
    }

    #[test]
    fn eof_before_terminal_is_truncation() {
        let data = b"TOY\x01\x00\x01a";
        let info = run(&Toy, &data[..], &opts());
        assert_eq!(info.well_formed, Tristate::False);
        assert_eq!(info.messages[0].id, "CORE-TRUNCATED");
        assert_eq!(info.messages[0].offset, Some(data.len() as u64));
        assert!(info.checksums.is_empty());
    }

    #[test]
    fn only_the_first_fault_is_reported() {
        let info = run(&Toy, &b"TOY\x01\x00\x05ab"[..], &opts());
        assert_eq!(info.well_formed, Tristate::False);
        let ids: Vec<&str> = info.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["CORE-TRUNCATED"]);
        assert_eq!(info.matched_signatures, vec!["TOY"]);
    }

    #[test]
    fn short_magic_records_no_signature() {
        let info = run(&Toy, &b"TO"[..], &opts());
        assert_eq!(info.messages[0].id, "CORE-TRUNCATED");
        assert!(info.matched_signatures.is_empty());
    }

    #[test]
    fn unit_guard_trips() {
        let mut data = b"TOY".to_vec();
        for _ in 0..10 {
            data.extend_from_slice(&[7, 0, 0]);
        }
        data.push(0);
        let info = run(&Toy, &data[..], &ParseOptions::default().max_units(5));
        assert_eq!(info.well_formed, Tristate::False);
        assert_eq!(info.messages[0].id, "CORE-ITERATION-LIMIT");
    }

    #[test]
    fn trailing_bytes_are_advisory() {
        let data = b"TOY\x00junk";
        let info = run(&Toy, &data[..], &opts());
        assert_eq!(info.valid, Tristate::True);
        assert_eq!(info.size, Some(4));
        assert_eq!(info.messages[0].id, "CORE-TRAILING-DATA");
    }
}
