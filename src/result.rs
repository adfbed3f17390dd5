//! Validation result types: the two-axis verdict, the diagnostic trail and the property tree.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::StructuralFault;
use crate::property::Property;

/// Three-valued flag used for both the well-formed and the valid axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Tristate {
    True,
    False,
    Undetermined,
}

impl Tristate {
    #[inline]
    pub fn is_true(self) -> bool {
        self == Tristate::True
    }
}

/// Message severity. Info messages are advisory and never change a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Info,
    Error,
}

/// One diagnostic, in detection order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Message {
    /// Stable identifier (e.g. "PNG-PLTE-AFTER-IDAT").
    pub id: String,
    pub severity: Severity,
    pub text: String,
    /// Optional detail, such as the offending value.
    pub sub_text: Option<String>,
    /// Byte offset the problem was detected at.
    pub offset: Option<u64>,
}

/// Whole-stream checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Checksum {
    pub algorithm: &'static str,
    pub value: String,
}

/// Representation information for one parsed document.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RepInfo {
    pub format: String,
    pub version: Option<String>,
    pub mime_type: Option<String>,
    pub well_formed: Tristate,
    pub valid: Tristate,
    /// Bytes consumed through the terminal unit.
    pub size: Option<u64>,
    /// Modules whose magic matched, in match order.
    pub matched_signatures: Vec<String>,
    /// Satisfied conformance profiles, in order of recognition.
    pub profiles: Vec<String>,
    pub messages: Vec<Message>,
    pub properties: Vec<Property>,
    pub checksums: Vec<Checksum>,
    #[cfg_attr(feature = "serde", serde(skip))]
    structural_seen: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    policy_seen: bool,
}

impl RepInfo {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            version: None,
            mime_type: None,
            well_formed: Tristate::Undetermined,
            valid: Tristate::Undetermined,
            size: None,
            matched_signatures: Vec::new(),
            profiles: Vec::new(),
            messages: Vec::new(),
            properties: Vec::new(),
            checksums: Vec::new(),
            structural_seen: false,
            policy_seen: false,
        }
    }

    /// Record a structural fault: error message, not well-formed, therefore not valid.
    pub fn structural(&mut self, fault: &StructuralFault) {
        self.messages.push(Message {
            id: fault.id().to_string(),
            severity: Severity::Error,
            text: fault.to_string(),
            sub_text: None,
            offset: Some(fault.offset()),
        });
        self.structural_seen = true;
        self.well_formed = Tristate::False;
        self.valid = Tristate::False;
    }

    /// Record a policy violation: error message, not valid, parsing continues.
    pub fn policy(&mut self, id: &str, text: impl Into<String>, offset: u64) {
        self.push_error(id, text.into(), None, offset);
    }

    /// Policy violation with a parameterised detail line.
    pub fn policy_with(&mut self, id: &str, text: impl Into<String>, sub_text: impl Into<String>, offset: u64) {
        self.push_error(id, text.into(), Some(sub_text.into()), offset);
    }

    /// Advisory message; affects neither flag.
    pub fn info(&mut self, id: &str, text: impl Into<String>, offset: Option<u64>) {
        self.messages.push(Message {
            id: id.to_string(),
            severity: Severity::Info,
            text: text.into(),
            sub_text: None,
            offset,
        });
    }

    fn push_error(&mut self, id: &str, text: String, sub_text: Option<String>, offset: u64) {
        self.messages.push(Message {
            id: id.to_string(),
            severity: Severity::Error,
            text,
            sub_text,
            offset: Some(offset),
        });
        self.policy_seen = true;
        self.valid = Tristate::False;
    }

    /// Add a matched signature once.
    pub fn add_signature(&mut self, module: &str) {
        if !self.matched_signatures.iter().any(|s| s == module) {
            self.matched_signatures.push(module.to_string());
        }
    }

    /// Add a satisfied profile once.
    pub fn add_profile(&mut self, profile: impl Into<String>) {
        let profile = profile.into();
        if !self.profiles.contains(&profile) {
            self.profiles.push(profile);
        }
    }

    /// Any error recorded so far (structural or policy).
    pub fn has_errors(&self) -> bool {
        self.structural_seen || self.policy_seen
    }

    /// Messages with the given id, in detection order.
    pub fn messages_with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages.iter().filter(move |m| m.id == id)
    }

    /// Top-level property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Fold the recorded violations into the final two-axis verdict.
    pub fn finalize(&mut self) {
        self.well_formed = if self.structural_seen {
            Tristate::False
        } else {
            Tristate::True
        };
        self.valid = if self.well_formed.is_true() && !self.policy_seen {
            Tristate::True
        } else {
            Tristate::False
        };
    }
}
