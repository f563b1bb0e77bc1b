use ndisk_kernel::{SAFE_ALPHABET, safe_nanoid};
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn alphabet_has_no_look_alikes() {
    for ambiguous in ['0', '1', 'I', 'O', 'l', 'o', 'i'] {
        assert!(!SAFE_ALPHABET.contains(&ambiguous), "{ambiguous} should be excluded");
    }
    let distinct: HashSet<_> = SAFE_ALPHABET.iter().collect();
    assert_eq!(distinct.len(), SAFE_ALPHABET.len());
}

#[test]
fn default_tokens_are_short_and_distinct() {
    let tokens: HashSet<String> = (0..1_000).map(|_| safe_nanoid!()).collect();
    assert_eq!(tokens.len(), 1_000);
    assert!(tokens.iter().all(|token| token.len() == 12));
}

proptest! {
    #[test]
    fn sized_tokens_use_the_safe_alphabet(size in 1usize..64) {
        let token = safe_nanoid!(size);
        prop_assert_eq!(token.chars().count(), size);
        prop_assert!(token.chars().all(|c| SAFE_ALPHABET.contains(&c)));
    }
}
