use ndisk_kernel::hash::{ContentHasher, content_hash, is_content_hash};
use proptest::prelude::*;

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[test]
fn empty_payload_has_well_known_hash() {
    assert_eq!(content_hash(b""), EMPTY_SHA256);
    let digest = ContentHasher::new().finalize();
    assert_eq!(digest.hash, EMPTY_SHA256);
    assert_eq!(digest.size, 0);
}

#[test]
fn recognizes_hash_shape() {
    assert!(is_content_hash(&content_hash(b"abc")));
    assert!(!is_content_hash("abc"));
    assert!(!is_content_hash(&content_hash(b"abc").to_uppercase()));
}

proptest! {
    #[test]
    fn chunked_hash_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..4096), split in 1usize..512) {
        let mut hasher = ContentHasher::new();
        for chunk in data.chunks(split) {
            hasher.update(chunk);
        }
        let digest = hasher.finalize();
        prop_assert_eq!(digest.size, data.len() as u64);
        prop_assert_eq!(digest.hash, content_hash(&data));
    }
}
