// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Owned copy of the bundle's string region.
//!
//! Strings in the file are packed records of a 32-bit length prefix
//! followed by the payload and a NUL terminator; the records are packed,
//! so the length prefix may sit at any byte offset and is read unaligned.
//! A handle is the string's absolute file offset; handle 0 means
//! "absent/empty". Handles referenced by the tree are resolved into [`Str`]
//! views during load; bytecode parameters keep raw handles and go through
//! [`StringTable::lookup`] at eval time.

use crate::error::{LoadError, Result};

/// A resolved, validated view into the string table: payload offset and
/// length in bytes. The empty string is the default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Str {
    off: u32,
    len: u32,
}

impl Str {
    /// Length of the string in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for the empty string (including the absent handle 0).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The string region of a bundle, copied verbatim, plus the region's
/// offset in the file so handles can be rebased.
#[derive(Debug)]
pub struct StringTable {
    bytes: Box<[u8]>,
    base_offset: u32,
}

impl StringTable {
    /// Take ownership of the string region. `base_offset` is the region's
    /// offset within the bundle file.
    pub fn new(region: &[u8], base_offset: u32) -> Self {
        Self {
            bytes: region.into(),
            base_offset,
        }
    }

    /// Resolve and validate a handle into a [`Str`] view.
    ///
    /// Checks the length prefix, the NUL terminator, and that the payload
    /// is valid UTF-8. Handle 0 resolves to the empty string.
    pub fn get(&self, handle: u32) -> Result<Str> {
        if handle == 0 {
            return Ok(Str::default());
        }

        let rel = handle
            .checked_sub(self.base_offset)
            .ok_or(LoadError::BadStringHandle(handle))? as usize;
        // Unaligned length prefix.
        let prefix = self
            .bytes
            .get(rel..rel + 4)
            .ok_or(LoadError::BadStringHandle(handle))?;
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

        let start = rel + 4;
        let payload = self
            .bytes
            .get(start..start + len)
            .ok_or(LoadError::BadStringHandle(handle))?;
        // The payload is NUL-terminated; the NUL is not part of the length.
        if self.bytes.get(start + len) != Some(&0) {
            return Err(LoadError::BadStringHandle(handle));
        }
        std::str::from_utf8(payload).map_err(|_| LoadError::InvalidUtf8(handle))?;

        Ok(Str {
            off: start as u32,
            len: len as u32,
        })
    }

    /// Resolve a handle at runtime, for bytecode string parameters.
    /// Returns `None` instead of an error so the evaluator can report the
    /// failure in its own terms.
    pub fn lookup(&self, handle: u32) -> Option<&str> {
        self.get(handle).ok().map(|s| self.resolve(s))
    }

    /// The text of a [`Str`] produced by [`StringTable::get`].
    pub fn resolve(&self, s: Str) -> &str {
        let bytes = &self.bytes[s.off as usize..(s.off + s.len) as usize];
        // Str views only come out of get(), which validated UTF-8.
        std::str::from_utf8(bytes).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a region of packed records and return (region, offsets).
    fn region(strings: &[&str]) -> (Vec<u8>, Vec<u32>) {
        let mut bytes = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(bytes.len() as u32);
            bytes.extend((s.len() as u32).to_le_bytes());
            bytes.extend(s.as_bytes());
            bytes.push(0);
        }
        (bytes, offsets)
    }

    #[test]
    fn handle_zero_is_empty() {
        let table = StringTable::new(&[], 64);
        let s = table.get(0).unwrap();
        assert!(s.is_empty());
        assert_eq!(table.resolve(s), "");
    }

    #[test]
    fn resolves_packed_strings() {
        let (bytes, offsets) = region(&["hello", "", "worlds"]);
        let base = 100;
        let table = StringTable::new(&bytes, base);

        let s = table.get(base + offsets[0]).unwrap();
        assert_eq!(table.resolve(s), "hello");
        let s = table.get(base + offsets[1]).unwrap();
        assert_eq!(table.resolve(s), "");
        let s = table.get(base + offsets[2]).unwrap();
        assert_eq!(table.resolve(s), "worlds");
    }

    #[test]
    fn unaligned_length_prefix() {
        // "a" gives the next record an offset of 6, which is not 4-aligned.
        let (bytes, offsets) = region(&["a", "unaligned"]);
        assert_eq!(offsets[1] % 4, 2);
        let table = StringTable::new(&bytes, 100);
        let s = table.get(100 + offsets[1]).unwrap();
        assert_eq!(table.resolve(s), "unaligned");
    }

    #[test]
    fn handle_before_base_is_rejected() {
        let (bytes, _) = region(&["x"]);
        let table = StringTable::new(&bytes, 100);
        assert!(matches!(table.get(50), Err(LoadError::BadStringHandle(50))));
    }

    #[test]
    fn handle_past_end_is_rejected() {
        let (bytes, _) = region(&["x"]);
        let table = StringTable::new(&bytes, 100);
        assert!(table.get(100 + bytes.len() as u32).is_err());
    }

    #[test]
    fn missing_nul_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend(4u32.to_le_bytes());
        bytes.extend(b"oops"); // no terminator
        let table = StringTable::new(&bytes, 100);
        assert!(table.get(100).is_err());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend(2u32.to_le_bytes());
        bytes.extend([0xff, 0xfe, 0x00]);
        let table = StringTable::new(&bytes, 100);
        assert!(matches!(table.get(100), Err(LoadError::InvalidUtf8(100))));
    }

    #[test]
    fn runtime_lookup_is_total() {
        let (bytes, offsets) = region(&["var"]);
        let table = StringTable::new(&bytes, 100);
        assert_eq!(table.lookup(100 + offsets[0]), Some("var"));
        assert_eq!(table.lookup(0), Some(""));
        assert_eq!(table.lookup(9999), None);
    }
}
