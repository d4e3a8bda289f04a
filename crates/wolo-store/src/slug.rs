// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Human-readable session identifiers (`brave-fox` style).

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "crimson", "curious", "eager", "fuzzy", "gentle", "golden",
    "happy", "keen", "lively", "lucky", "mellow", "nimble", "patient", "proud", "quiet",
    "rapid", "silent", "solid", "swift", "tidy", "witty",
];

const ANIMALS: &[&str] = &[
    "badger", "bison", "crane", "dingo", "falcon", "ferret", "fox", "gecko", "heron",
    "ibis", "lemur", "lynx", "marmot", "otter", "owl", "panda", "raven", "seal",
    "shrew", "sparrow", "stoat", "tapir", "walrus", "wren",
];

/// Generate a slug not present in `taken`.
///
/// Entropy comes from a fresh v4 UUID rather than a dedicated RNG; two words
/// give 576 combinations, so collisions fall back to a numeric suffix.
pub fn generate(taken: &[String]) -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let adj = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let animal = ANIMALS[bytes[1] as usize % ANIMALS.len()];
    let base = format!("{adj}-{animal}");
    if !taken.iter().any(|t| t == &base) {
        return base;
    }
    for n in 2.. {
        let candidate = format!("{base}-{n}");
        if !taken.iter().any(|t| t == &candidate) {
            return candidate;
        }
    }
    unreachable!("suffix search is unbounded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_adjective_dash_animal() {
        let s = generate(&[]);
        let mut parts = s.split('-');
        let adj = parts.next().unwrap();
        let animal = parts.next().unwrap();
        assert!(ADJECTIVES.contains(&adj));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn collision_gets_numeric_suffix() {
        // Exhaust the base name by taking every combination.
        let mut taken: Vec<String> = Vec::new();
        for a in ADJECTIVES {
            for b in ANIMALS {
                taken.push(format!("{a}-{b}"));
            }
        }
        let s = generate(&taken);
        assert!(s.ends_with("-2"), "expected suffix, got {s}");
    }

    #[test]
    fn suffix_increments_past_existing() {
        let mut taken: Vec<String> = Vec::new();
        for a in ADJECTIVES {
            for b in ANIMALS {
                taken.push(format!("{a}-{b}"));
                taken.push(format!("{a}-{b}-2"));
            }
        }
        let s = generate(&taken);
        assert!(s.ends_with("-3"), "expected -3 suffix, got {s}");
    }
}
