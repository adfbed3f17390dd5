//! Sequential byte reader with attachable running checksums.
//!
//! Every byte a format handler sees goes through [`ChecksummingCursor`]. Reads and skips
//! feed the open unit checksum scope (if any) and the whole-stream digests (if enabled),
//! so padding that is discarded still counts toward both the checksum and the offset.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

use crate::error::StructuralFault;

/// Chunk size used when skipping or reading large payloads.
const SCRATCH_LEN: usize = 8 * 1024;

/// Byte order for multi-byte reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Read a `u16` from a slice at `offset`; `None` when out of bounds.
    #[inline]
    pub fn u16_at(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes = data.get(offset..offset.checked_add(2)?)?;
        let b = [bytes[0], bytes[1]];
        Some(match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    /// Read a `u32` from a slice at `offset`; `None` when out of bounds.
    #[inline]
    pub fn u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes = data.get(offset..offset.checked_add(4)?)?;
        let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
        Some(match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }
}

/// Whole-stream digests, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDigest {
    pub crc32: String,
    pub sha256: String,
}

struct StreamDigests {
    crc32: crc32fast::Hasher,
    sha256: Sha256,
}

/// Forward-only reader that tracks the byte offset and feeds running checksums.
pub struct ChecksummingCursor<R> {
    inner: R,
    consumed: u64,
    peeked: Option<u8>,
    unit_crc: Option<crc32fast::Hasher>,
    digests: Option<StreamDigests>,
}

impl<R: Read> ChecksummingCursor<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            peeked: None,
            unit_crc: None,
            digests: None,
        }
    }

    /// Also compute CRC-32 and SHA-256 over every consumed byte.
    pub fn with_stream_digests(mut self) -> Self {
        self.digests = Some(StreamDigests {
            crc32: crc32fast::Hasher::new(),
            sha256: Sha256::new(),
        });
        self
    }

    /// Total bytes consumed so far, including skipped bytes.
    #[inline]
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Open a CRC-32 scope. Any previously open scope is discarded.
    pub fn begin_crc(&mut self) {
        self.unit_crc = Some(crc32fast::Hasher::new());
    }

    /// Close the open CRC scope and read the 4-byte checksum that follows it.
    ///
    /// The stored value is read after the scope is closed, so it never feeds itself.
    /// Returns `(stored, computed)`.
    pub fn read_crc_trailer(&mut self, endian: Endian) -> Result<(u32, u32), StructuralFault> {
        let computed = self
            .unit_crc
            .take()
            .map(|h| h.finalize())
            .unwrap_or_else(|| crc32fast::Hasher::new().finalize());
        let stored = self.read_u32(endian)?;
        Ok((stored, computed))
    }

    pub fn read_u8(&mut self) -> Result<u8, StructuralFault> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16, StructuralFault> {
        let b = self.read_array::<2>()?;
        Ok(match endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32, StructuralFault> {
        let b = self.read_array::<4>()?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }

    pub fn read_u64(&mut self, endian: Endian) -> Result<u64, StructuralFault> {
        let b = self.read_array::<8>()?;
        Ok(match endian {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        })
    }

    /// Read exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StructuralFault> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly `len` bytes into a new buffer.
    ///
    /// The buffer grows as data arrives, so a huge declared length on a short stream
    /// fails with truncation before it can allocate.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, StructuralFault> {
        let mut out = Vec::with_capacity(len.min(SCRATCH_LEN as u64) as usize);
        let mut scratch = [0u8; SCRATCH_LEN];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(SCRATCH_LEN as u64) as usize;
            self.fill(&mut scratch[..n])?;
            out.extend_from_slice(&scratch[..n]);
            remaining -= n as u64;
        }
        Ok(out)
    }

    /// Consume and discard `len` bytes. They still feed every active checksum.
    pub fn skip(&mut self, len: u64) -> Result<(), StructuralFault> {
        let mut scratch = [0u8; SCRATCH_LEN];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(SCRATCH_LEN as u64) as usize;
            self.fill(&mut scratch[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Consume everything left in the stream, failing once more than `limit` bytes arrive.
    pub fn read_to_end(&mut self, limit: u64) -> Result<Vec<u8>, StructuralFault> {
        let mut out = Vec::new();
        let mut scratch = [0u8; SCRATCH_LEN];
        if let Some(b) = self.peeked.take() {
            self.feed(&[b]);
            out.push(b);
        }
        loop {
            let n = match self.inner.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StructuralFault::Io {
                        offset: self.consumed,
                        source,
                    })
                }
            };
            self.feed(&scratch[..n]);
            out.extend_from_slice(&scratch[..n]);
            if out.len() as u64 > limit {
                return Err(StructuralFault::IterationLimit {
                    what: "buffered bytes",
                    limit: limit.try_into().unwrap_or(usize::MAX),
                    offset: self.consumed,
                });
            }
        }
        Ok(out)
    }

    /// Consume and discard everything left in the stream. Returns the byte count.
    pub fn skip_to_end(&mut self) -> Result<u64, StructuralFault> {
        let start = self.consumed;
        let mut scratch = [0u8; SCRATCH_LEN];
        if let Some(b) = self.peeked.take() {
            self.feed(&[b]);
        }
        loop {
            match self.inner.read(&mut scratch) {
                Ok(0) => return Ok(self.consumed - start),
                Ok(n) => self.feed(&scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StructuralFault::Io {
                        offset: self.consumed,
                        source,
                    })
                }
            }
        }
    }

    /// True when no further byte is available. Peeks one byte without counting it.
    pub fn is_at_end(&mut self) -> Result<bool, StructuralFault> {
        if self.peeked.is_some() {
            return Ok(false);
        }
        let mut b = [0u8; 1];
        loop {
            match self.inner.read(&mut b) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.peeked = Some(b[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StructuralFault::Io {
                        offset: self.consumed,
                        source,
                    })
                }
            }
        }
    }

    /// Finish the whole-stream digests, if they were enabled.
    pub fn stream_digest(&self) -> Option<StreamDigest> {
        self.digests.as_ref().map(|d| StreamDigest {
            crc32: format!("{:08x}", d.crc32.clone().finalize()),
            sha256: format!("{:x}", d.sha256.clone().finalize()),
        })
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), StructuralFault> {
        let mut got = 0;
        if let (Some(b), Some(first)) = (self.peeked, buf.first_mut()) {
            *first = b;
            self.peeked = None;
            got = 1;
        }
        while got < buf.len() {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => {
                    self.feed(&buf[..got]);
                    return Err(StructuralFault::TruncatedStream {
                        offset: self.consumed,
                    });
                }
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.feed(&buf[..got]);
                    return Err(StructuralFault::Io {
                        offset: self.consumed,
                        source,
                    });
                }
            }
        }
        self.feed(buf);
        Ok(())
    }

    fn feed(&mut self, bytes: &[u8]) {
        if let Some(crc) = self.unit_crc.as_mut() {
            crc.update(bytes);
        }
        if let Some(d) = self.digests.as_mut() {
            d.crc32.update(bytes);
            d.sha256.update(bytes);
        }
        self.consumed += bytes.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_byte_orders() {
        let data = [0x12u8, 0x34, 0x12, 0x34];
        let mut c = ChecksummingCursor::new(&data[..]);
        assert_eq!(c.read_u16(Endian::Big).unwrap(), 0x1234);
        assert_eq!(c.read_u16(Endian::Little).unwrap(), 0x3412);
        assert_eq!(c.bytes_consumed(), 4);
    }

    #[test]
    fn truncation_offset_is_where_data_ran_out() {
        let data = [1u8, 2, 3];
        let mut c = ChecksummingCursor::new(&data[..]);
        c.read_u8().unwrap();
        let err = c.read_u32(Endian::Big).unwrap_err();
        assert!(matches!(err, StructuralFault::TruncatedStream { offset: 3 }));
    }

    #[test]
    fn skipped_bytes_feed_the_crc() {
        // CRC-32 of "IEND" is the well-known 0xAE426082.
        let mut data = b"IEND".to_vec();
        data.extend_from_slice(&0xAE42_6082u32.to_be_bytes());
        let mut c = ChecksummingCursor::new(&data[..]);
        c.begin_crc();
        c.read_u16(Endian::Big).unwrap();
        c.skip(2).unwrap();
        let (stored, computed) = c.read_crc_trailer(Endian::Big).unwrap();
        assert_eq!(stored, computed);
        assert_eq!(c.bytes_consumed(), 8);
    }

    #[test]
    fn peek_does_not_count_until_consumed() {
        let data = [9u8, 8];
        let mut c = ChecksummingCursor::new(&data[..]);
        assert!(!c.is_at_end().unwrap());
        assert_eq!(c.bytes_consumed(), 0);
        assert_eq!(c.read_u8().unwrap(), 9);
        assert_eq!(c.read_u8().unwrap(), 8);
        assert!(c.is_at_end().unwrap());
    }

    #[test]
    fn read_bytes_fails_before_allocating_huge_buffers() {
        let data = [0u8; 10];
        let mut c = ChecksummingCursor::new(&data[..]);
        let err = c.read_bytes(u32::MAX as u64).unwrap_err();
        assert!(matches!(err, StructuralFault::TruncatedStream { offset: 10 }));
    }

    #[test]
    fn stream_digest_covers_everything_read() {
        let data = b"abc";
        let mut c = ChecksummingCursor::new(&data[..]).with_stream_digests();
        c.skip(3).unwrap();
        let d = c.stream_digest().unwrap();
        assert_eq!(
            d.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(d.crc32, "352441c2");
    }

    #[test]
    fn endian_slice_reads_are_bounds_checked() {
        let data = [0x2Au8, 0x00, 0x00];
        assert_eq!(Endian::Little.u16_at(&data, 0), Some(42));
        assert_eq!(Endian::Little.u32_at(&data, 0), None);
        assert_eq!(Endian::Big.u16_at(&data, usize::MAX), None);
    }
}
