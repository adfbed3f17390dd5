//! Byte-string helpers shared by the text-bearing units of several formats.

/// Decode ISO 8859-1 bytes.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode bytes as ASCII-ish text, stopping at the first NUL and trimming trailing spaces.
pub fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    latin1(&bytes[..end]).trim_end().to_string()
}

/// Split at the first NUL: `(before, Some(after))`, or `(all, None)` when there is none.
pub fn split_nul(bytes: &[u8]) -> (&[u8], Option<&[u8]>) {
    match bytes.iter().position(|&b| b == 0) {
        Some(i) => (&bytes[..i], Some(&bytes[i + 1..])),
        None => (bytes, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_maps_high_bytes() {
        assert_eq!(latin1(&[0x41, 0xE9]), "Aé");
    }

    #[test]
    fn split_and_terminate() {
        assert_eq!(split_nul(b"Title\0Hello"), (&b"Title"[..], Some(&b"Hello"[..])));
        assert_eq!(split_nul(b"Title"), (&b"Title"[..], None));
        assert_eq!(nul_terminated(b"Canon  \0junk"), "Canon");
    }
}
