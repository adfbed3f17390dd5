//! Aggregate technical metadata accumulated across units.
//!
//! Several unit types can populate the same field. Precedence is explicit per write:
//! a [`Rank::Default`] value only fills an empty slot, a [`Rank::Specific`] value
//! replaces an empty or default slot, and the first specific writer wins.

use crate::property::{Property, Value};

/// Precedence of a metadata write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Default,
    Specific,
}

/// One metadata field with first-specific-writer-wins semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<T> {
    value: Option<(T, Rank)>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> Slot<T> {
    /// Offer a value. Returns whether it was stored.
    pub fn offer(&mut self, value: T, rank: Rank) -> bool {
        let take = match &self.value {
            None => true,
            Some((_, Rank::Default)) => rank == Rank::Specific,
            Some((_, Rank::Specific)) => false,
        };
        if take {
            self.value = Some((value, rank));
        }
        take
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref().map(|(v, _)| v)
    }

    pub fn rank(&self) -> Option<Rank> {
        self.value.as_ref().map(|(_, r)| *r)
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Clone + Into<Value>> Slot<T> {
    fn push_to(&self, name: &str, out: &mut Vec<Property>) {
        if let Some(v) = self.get() {
            out.push(Property::scalar(name, v.clone()));
        }
    }
}

/// Resolution expressed as a rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub numerator: u32,
    pub denominator: u32,
}

/// Still-image technical metadata.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub width: Slot<u32>,
    pub height: Slot<u32>,
    pub bits_per_sample: Slot<String>,
    pub samples_per_pixel: Slot<u16>,
    pub color_space: Slot<String>,
    pub compression: Slot<String>,
    pub x_resolution: Slot<Resolution>,
    pub y_resolution: Slot<Resolution>,
    pub resolution_unit: Slot<String>,
}

impl ImageMetadata {
    /// `ImageMetadata` group holding the populated fields, or `None` when nothing is set.
    pub fn to_property(&self) -> Option<Property> {
        let mut props = Vec::new();
        self.width.push_to("ImageWidth", &mut props);
        self.height.push_to("ImageHeight", &mut props);
        self.bits_per_sample.push_to("BitsPerSample", &mut props);
        self.samples_per_pixel.push_to("SamplesPerPixel", &mut props);
        self.color_space.push_to("ColorSpace", &mut props);
        self.compression.push_to("Compression", &mut props);
        if let Some(r) = self.x_resolution.get() {
            props.push(Property::rational("XResolution", r.numerator, r.denominator));
        }
        if let Some(r) = self.y_resolution.get() {
            props.push(Property::rational("YResolution", r.numerator, r.denominator));
        }
        self.resolution_unit.push_to("ResolutionUnit", &mut props);
        (!props.is_empty()).then(|| Property::nested("ImageMetadata", props))
    }
}

/// Audio technical metadata.
#[derive(Debug, Clone, Default)]
pub struct AudioMetadata {
    pub format: Slot<String>,
    pub sample_rate: Slot<u32>,
    pub channels: Slot<u16>,
    pub bits_per_sample: Slot<u16>,
    pub block_align: Slot<u16>,
    pub byte_rate: Slot<u32>,
    pub sample_count: Slot<u64>,
}

impl AudioMetadata {
    /// Duration in milliseconds, when both sample count and rate are known.
    pub fn duration_ms(&self) -> Option<u64> {
        let count = *self.sample_count.get()?;
        let rate = u64::from(*self.sample_rate.get()?);
        (rate > 0).then(|| count.saturating_mul(1000) / rate)
    }

    pub fn to_property(&self) -> Option<Property> {
        let mut props = Vec::new();
        self.format.push_to("AudioFormat", &mut props);
        self.sample_rate.push_to("SampleRate", &mut props);
        self.channels.push_to("Channels", &mut props);
        self.bits_per_sample.push_to("BitsPerSample", &mut props);
        self.block_align.push_to("BlockAlign", &mut props);
        self.byte_rate.push_to("ByteRate", &mut props);
        self.sample_count.push_to("SampleCount", &mut props);
        if let Some(ms) = self.duration_ms() {
            props.push(Property::scalar("DurationMillis", ms));
        }
        (!props.is_empty()).then(|| Property::nested("AudioMetadata", props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_never_overwrites() {
        let mut s = Slot::default();
        assert!(s.offer(72u32, Rank::Default));
        assert!(!s.offer(96u32, Rank::Default));
        assert_eq!(s.get(), Some(&72));
    }

    #[test]
    fn first_specific_writer_wins() {
        let mut s = Slot::default();
        s.offer(72u32, Rank::Default);
        assert!(s.offer(300u32, Rank::Specific));
        assert!(!s.offer(600u32, Rank::Specific));
        assert!(!s.offer(1u32, Rank::Default));
        assert_eq!(s.get(), Some(&300));
        assert_eq!(s.rank(), Some(Rank::Specific));
    }

    #[test]
    fn specific_before_default_is_kept() {
        let mut s = Slot::default();
        s.offer("sRGB".to_string(), Rank::Specific);
        s.offer("calibrated RGB".to_string(), Rank::Default);
        assert_eq!(s.get().map(String::as_str), Some("sRGB"));
    }

    #[test]
    fn empty_metadata_renders_nothing() {
        assert!(ImageMetadata::default().to_property().is_none());
        assert!(AudioMetadata::default().to_property().is_none());
    }

    #[test]
    fn audio_duration() {
        let mut a = AudioMetadata::default();
        a.sample_rate.offer(8000, Rank::Specific);
        a.sample_count.offer(4000, Rank::Default);
        assert_eq!(a.duration_ms(), Some(500));
    }
}
