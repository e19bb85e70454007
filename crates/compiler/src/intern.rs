//! Interned string pool
//!
//! Identifiers and string literals are deduplicated by content: interning
//! equal bytes returns the same [`Name`], so equality checks throughout
//! the front-end reduce to a `u32` comparison. The pool owns the bytes for
//! the lifetime of the compiler session.
//!
//! A 32-bit FNV-1a hash of the content is computed once at interning time
//! and kept with the entry; downstream consumers (constant pools, code
//! generators) can fetch it without rehashing.

use fxhash::FxHashMap;

/// Handle to an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Name(u32);

impl Name {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// 32-bit FNV-1a over raw bytes.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deduplicating store of identifiers and literals.
#[derive(Debug)]
pub struct StringPool {
    map: FxHashMap<Box<str>, Name>,
    // Byte storage and per-entry metadata are kept apart so the strings
    // outlive any metadata churn.
    strings: Vec<Box<str>>,
    hashes: Vec<u32>,
}

impl StringPool {
    pub fn new() -> Self {
        StringPool {
            map: FxHashMap::default(),
            strings: Vec::new(),
            hashes: Vec::new(),
        }
    }

    /// Intern `text`, returning the existing handle when the content has
    /// been seen before.
    pub fn intern(&mut self, text: &str) -> Name {
        if let Some(&name) = self.map.get(text) {
            return name;
        }
        let name = Name(u32::try_from(self.strings.len()).expect("string pool exhausted"));
        self.strings.push(text.into());
        self.hashes.push(fnv1a(text.as_bytes()));
        self.map.insert(text.into(), name);
        name
    }

    /// The content of an interned string.
    pub fn get(&self, name: Name) -> &str {
        &self.strings[name.index()]
    }

    /// Precomputed FNV-1a hash of the content.
    pub fn hash(&self, name: Name) -> u32 {
        self.hashes[name.index()]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringPool {
    fn default() -> Self {
        StringPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_deduplicates() {
        let mut pool = StringPool::new();
        let a = pool.intern("local");
        let b = pool.intern("local");
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_distinct_content_distinct_names() {
        let mut pool = StringPool::new();
        let a = pool.intern("x");
        let b = pool.intern("y");
        assert_ne!(a, b);
        assert_eq!(pool.get(a), "x");
        assert_eq!(pool.get(b), "y");
    }

    #[test]
    fn test_hash_matches_fnv1a_of_bytes() {
        let mut pool = StringPool::new();
        let n = pool.intern("print");
        assert_eq!(pool.hash(n), fnv1a(b"print"));
    }

    #[test]
    fn test_identity_tracks_content_over_any_sequence() {
        // Interning the same multiset of strings in two different orders
        // must agree: equal ids iff equal bytes.
        let words = ["a", "bb", "a", "ccc", "bb", "", "a"];
        let mut forward = StringPool::new();
        let fwd: Vec<Name> = words.iter().map(|w| forward.intern(w)).collect();
        let mut backward = StringPool::new();
        let bwd: Vec<Name> = words.iter().rev().map(|w| backward.intern(w)).collect();

        for (i, wi) in words.iter().enumerate() {
            for (j, wj) in words.iter().enumerate() {
                assert_eq!(fwd[i] == fwd[j], wi == wj);
                let ri = words.len() - 1 - i;
                let rj = words.len() - 1 - j;
                assert_eq!(bwd[ri] == bwd[rj], wi == wj);
            }
        }
    }

    #[test]
    fn test_empty_string_is_internable() {
        let mut pool = StringPool::new();
        let e = pool.intern("");
        assert_eq!(pool.get(e), "");
        assert_eq!(pool.hash(e), FNV_OFFSET_BASIS);
    }
}
