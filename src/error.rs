//! Structural (well-formedness) faults.
//!
//! A [`StructuralFault`] aborts the current parse. Policy (validity) problems are not
//! errors at all: handlers record them on the [`RepInfo`](crate::RepInfo) and keep going.

use std::io;

use thiserror::Error;

/// Abort-worthy violation of a format's byte-level grammar.
#[derive(Debug, Error)]
pub enum StructuralFault {
    /// Fewer bytes were available than a read asked for.
    #[error("unexpected end of stream at offset {offset}")]
    TruncatedStream { offset: u64 },

    /// A unit declared a payload shorter than its mandatory fields.
    #[error("{unit} declares {declared} bytes but needs at least {minimum}")]
    InsufficientData {
        unit: String,
        offset: u64,
        declared: u64,
        minimum: u64,
    },

    /// A handler read past the end of its declared payload.
    #[error("{unit} payload overran its declared length of {declared} bytes")]
    Overrun {
        unit: String,
        offset: u64,
        declared: u64,
    },

    /// Stored and computed unit checksums differ.
    #[error("checksum mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch {
        offset: u64,
        stored: u32,
        computed: u32,
    },

    /// The container preamble did not carry the expected magic bytes.
    #[error("bad signature for {format}")]
    BadSignature { format: &'static str, offset: u64 },

    /// A format-specific grammar violation.
    #[error("{text}")]
    Malformed {
        id: &'static str,
        offset: u64,
        text: String,
    },

    /// An iteration guard tripped.
    #[error("more than {limit} {what}; giving up")]
    IterationLimit {
        what: &'static str,
        limit: usize,
        offset: u64,
    },

    /// Underlying reader failed for a reason other than end of stream.
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

impl StructuralFault {
    /// Shorthand for [`StructuralFault::Malformed`].
    pub fn malformed(id: &'static str, offset: u64, text: impl Into<String>) -> Self {
        StructuralFault::Malformed {
            id,
            offset,
            text: text.into(),
        }
    }

    /// Stable message identifier used when the fault is reported.
    pub fn id(&self) -> &str {
        match self {
            StructuralFault::TruncatedStream { .. } => "CORE-TRUNCATED",
            StructuralFault::InsufficientData { .. } => "CORE-INSUFFICIENT-DATA",
            StructuralFault::Overrun { .. } => "CORE-OVERRUN",
            StructuralFault::ChecksumMismatch { .. } => "CORE-CHECKSUM",
            StructuralFault::BadSignature { .. } => "CORE-SIGNATURE",
            StructuralFault::Malformed { id, .. } => id,
            StructuralFault::IterationLimit { .. } => "CORE-ITERATION-LIMIT",
            StructuralFault::Io { .. } => "CORE-IO",
        }
    }

    /// Byte offset the fault was detected at.
    pub fn offset(&self) -> u64 {
        match self {
            StructuralFault::TruncatedStream { offset }
            | StructuralFault::InsufficientData { offset, .. }
            | StructuralFault::Overrun { offset, .. }
            | StructuralFault::ChecksumMismatch { offset, .. }
            | StructuralFault::BadSignature { offset, .. }
            | StructuralFault::Malformed { offset, .. }
            | StructuralFault::IterationLimit { offset, .. }
            | StructuralFault::Io { offset, .. } => *offset,
        }
    }
}
