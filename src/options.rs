//! Parse configuration.

/// Limits and switches for one parse.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseOptions {
    /// Maximum number of units the driver processes before giving up.
    pub max_units: usize,
    /// Maximum number of directories followed through offset chains (TIFF IFDs).
    pub max_ifds: usize,
    /// Largest unit payload a handler will buffer in memory; longer payloads are
    /// only partially interpreted and the rest is skipped.
    pub max_unit_alloc: u64,
    /// Largest stream buffered whole for random-access formats.
    pub max_buffered: u64,
    /// Compute CRC-32 and SHA-256 over the whole stream.
    pub compute_digests: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_units: 1_000_000,
            max_ifds: 1024,
            max_unit_alloc: 16 * 1024 * 1024,
            max_buffered: 1 << 32,
            compute_digests: true,
        }
    }
}

impl ParseOptions {
    pub fn max_units(mut self, n: usize) -> Self {
        self.max_units = n;
        self
    }

    pub fn max_ifds(mut self, n: usize) -> Self {
        self.max_ifds = n;
        self
    }

    pub fn max_unit_alloc(mut self, n: u64) -> Self {
        self.max_unit_alloc = n;
        self
    }

    pub fn max_buffered(mut self, n: u64) -> Self {
        self.max_buffered = n;
        self
    }

    pub fn compute_digests(mut self, on: bool) -> Self {
        self.compute_digests = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let options = ParseOptions::default()
            .max_units(7)
            .max_ifds(3)
            .max_unit_alloc(64)
            .max_buffered(128)
            .compute_digests(false);
        assert_eq!(
            options,
            ParseOptions {
                max_units: 7,
                max_ifds: 3,
                max_unit_alloc: 64,
                max_buffered: 128,
                compute_digests: false,
            }
        );
    }
}
