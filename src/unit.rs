//! Self-describing container units and the per-format dispatch table.
//!
//! A format module describes its units with a static [`UnitSpec`] table. The
//! [`Dispatcher`] binds a tag read from the stream to a [`Unit`] carrying the static
//! properties (category, duplicate rule, minimum payload) so handlers never infer them
//! from content.

use std::collections::BTreeMap;
use std::io::Read;

use crate::cursor::ChecksummingCursor;
use crate::error::StructuralFault;
use crate::result::RepInfo;

/// Numeric unit type code. Four-character codes are packed big-endian.
pub type Tag = u32;

/// Pack a four-character code into a [`Tag`].
#[inline]
pub const fn fourcc(code: &[u8; 4]) -> Tag {
    u32::from_be_bytes(*code)
}

/// Printable form of a four-character code, or hex when it is not ASCII.
pub fn fourcc_name(tag: Tag) -> String {
    let bytes = tag.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        format!("0x{:08X}", tag)
    }
}

/// Whether an implementation that does not know a unit may skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Category {
    Critical,
    Ancillary,
}

/// Static description of one known tag.
#[derive(Debug, Clone, Copy)]
pub struct UnitSpec {
    pub tag: Tag,
    pub name: &'static str,
    pub category: Category,
    pub duplicates_allowed: bool,
    /// Smallest payload that holds every mandatory field.
    pub min_len: u64,
}

impl UnitSpec {
    pub const fn new(
        tag: Tag,
        name: &'static str,
        category: Category,
        duplicates_allowed: bool,
        min_len: u64,
    ) -> Self {
        Self {
            tag,
            name,
            category,
            duplicates_allowed,
            min_len,
        }
    }
}

/// One unit read from the stream, bound to its static properties.
#[derive(Debug, Clone)]
pub struct Unit {
    pub tag: Tag,
    pub name: String,
    pub declared_length: u64,
    pub category: Category,
    pub duplicates_allowed: bool,
    /// Offset of the first byte of the unit (its header).
    pub offset: u64,
    /// Offset of the first payload byte.
    pub payload_start: u64,
    /// False when the tag is not in the format's table.
    pub known: bool,
    min_len: u64,
}

impl Unit {
    /// Fail with `InsufficientData` when the declared payload cannot hold the mandatory fields.
    pub fn require_min(&self) -> Result<(), StructuralFault> {
        if self.declared_length < self.min_len {
            return Err(StructuralFault::InsufficientData {
                unit: self.name.clone(),
                offset: self.offset,
                declared: self.declared_length,
                minimum: self.min_len,
            });
        }
        Ok(())
    }

    /// Payload bytes consumed so far by the handler.
    pub fn used<R: Read>(&self, cursor: &ChecksummingCursor<R>) -> u64 {
        cursor.bytes_consumed().saturating_sub(self.payload_start)
    }

    /// Payload bytes not yet consumed.
    pub fn remaining<R: Read>(&self, cursor: &ChecksummingCursor<R>) -> u64 {
        self.declared_length.saturating_sub(self.used(cursor))
    }

    /// Discard whatever the handler did not interpret so the cursor sits exactly on the
    /// unit boundary. Returns the number of bytes discarded.
    pub fn finish_payload<R: Read>(
        &self,
        cursor: &mut ChecksummingCursor<R>,
    ) -> Result<u64, StructuralFault> {
        let used = self.used(cursor);
        if used > self.declared_length {
            return Err(StructuralFault::Overrun {
                unit: self.name.clone(),
                offset: self.offset,
                declared: self.declared_length,
            });
        }
        let rest = self.declared_length - used;
        if rest > 0 {
            log::trace!("{}: discarding {} unused payload bytes", self.name, rest);
            cursor.skip(rest)?;
        }
        Ok(rest)
    }
}

/// Maps tags to [`Unit`]s using a static per-format table.
pub struct Dispatcher {
    table: &'static [UnitSpec],
    unknown_category: fn(Tag) -> Category,
    name_of: fn(Tag) -> String,
}

impl Dispatcher {
    /// `unknown_category` applies the format's convention for tags missing from `table`.
    pub const fn new(
        table: &'static [UnitSpec],
        unknown_category: fn(Tag) -> Category,
        name_of: fn(Tag) -> String,
    ) -> Self {
        Self {
            table,
            unknown_category,
            name_of,
        }
    }

    pub fn spec(&self, tag: Tag) -> Option<&'static UnitSpec> {
        self.table.iter().find(|s| s.tag == tag)
    }

    /// Bind a tag read at `offset` whose payload starts at `payload_start`.
    pub fn bind(&self, tag: Tag, declared_length: u64, offset: u64, payload_start: u64) -> Unit {
        match self.spec(tag) {
            Some(spec) => Unit {
                tag,
                name: spec.name.to_string(),
                declared_length,
                category: spec.category,
                duplicates_allowed: spec.duplicates_allowed,
                offset,
                payload_start,
                known: true,
                min_len: spec.min_len,
            },
            None => Unit {
                tag,
                name: (self.name_of)(tag),
                declared_length,
                category: (self.unknown_category)(tag),
                duplicates_allowed: true,
                offset,
                payload_start,
                known: false,
                min_len: 0,
            },
        }
    }
}

/// Consume an unknown unit: exactly its declared length, nothing interpreted.
pub fn pass_through<R: Read>(
    unit: &Unit,
    cursor: &mut ChecksummingCursor<R>,
) -> Result<(), StructuralFault> {
    unit.finish_payload(cursor).map(|_| ())
}

/// How a particular rule's violation is classified.
///
/// The classification belongs to the rule, not to the format: one format can have
/// ordering rules of both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleClass {
    /// Abort the parse; not well-formed.
    Structural,
    /// Record and continue; not valid.
    Policy,
}

impl RuleClass {
    /// Report a violation of a rule with this classification.
    ///
    /// Structural violations come back as `Err` for the handler to propagate; policy
    /// violations are recorded on `info` and return `Ok`.
    pub fn violated(
        self,
        info: &mut RepInfo,
        id: &'static str,
        offset: u64,
        text: impl Into<String>,
    ) -> Result<(), StructuralFault> {
        match self {
            RuleClass::Structural => Err(StructuralFault::malformed(id, offset, text)),
            RuleClass::Policy => {
                info.policy(id, text, offset);
                Ok(())
            }
        }
    }
}

/// What the driver should do after a unit was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Continue,
    Terminal,
}

pub type UnitResult = Result<UnitOutcome, StructuralFault>;

/// Record of which tags were seen, where first, and how often.
#[derive(Debug, Default, Clone)]
pub struct SeenUnits {
    seen: BTreeMap<Tag, (u64, u32)>,
}

impl SeenUnits {
    /// Note one occurrence. Returns the offset of the first occurrence when this is a repeat.
    pub fn note(&mut self, tag: Tag, offset: u64) -> Option<u64> {
        match self.seen.get_mut(&tag) {
            Some((first, count)) => {
                *count += 1;
                Some(*first)
            }
            None => {
                self.seen.insert(tag, (offset, 1));
                None
            }
        }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.seen.contains_key(&tag)
    }

    pub fn count(&self, tag: Tag) -> u32 {
        self.seen.get(&tag).map_or(0, |(_, c)| *c)
    }
}
