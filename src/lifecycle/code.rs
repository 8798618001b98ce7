//! Human-typable access codes.

use rand::Rng;
use std::fmt;

/// Characters a code may contain. Visually confusable glyphs (`0`, `O`, `1`,
/// `l`, `I`) are left out so codes survive being read aloud or retyped.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Default code length.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// A well-formed access code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code(String);

impl Code {
    /// Draw a fresh candidate of `length` characters, uniformly over
    /// [`ALPHABET`]. Uniqueness is the store's job, not ours.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Self {
        let code = (0..length)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Accept `raw` only if it has exactly `length` alphabet characters.
    pub fn parse(raw: &str, length: usize) -> Option<Self> {
        let well_formed = raw.len() == length && raw.bytes().all(|b| ALPHABET.contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_alphabet_excludes_confusables() {
        for c in [b'0', b'O', b'1', b'l', b'I'] {
            assert!(!ALPHABET.contains(&c), "{} must not be in the alphabet", c as char);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Code::parse("Ab3dEf9h", 8).is_some());
        assert!(Code::parse("Ab3dEf9", 8).is_none());
        assert!(Code::parse("Ab3dEf9hX", 8).is_none());
        assert!(Code::parse("Ab3dEf0h", 8).is_none());
        assert!(Code::parse("Ab3d f9h", 8).is_none());
        assert!(Code::parse("", 8).is_none());
        // Multi-byte characters never match
        assert!(Code::parse("Ab3dEfé", 8).is_none());
    }

    #[test]
    fn test_generate_uses_whole_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.extend(Code::generate(&mut rng, DEFAULT_CODE_LENGTH).0.into_bytes());
        }
        assert_eq!(seen.len(), ALPHABET.len());
    }

    proptest! {
        #[test]
        fn generated_codes_are_well_formed(seed in any::<u64>(), length in 1usize..32) {
            let mut rng = StdRng::seed_from_u64(seed);
            let code = Code::generate(&mut rng, length);
            prop_assert_eq!(code.as_str().len(), length);
            prop_assert!(Code::parse(code.as_str(), length).is_some());
        }
    }
}
