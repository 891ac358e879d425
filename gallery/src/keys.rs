//! KV key builders. Numbers are zero-padded to 20 digits so lexicographic
//! order equals numeric order.

use crate::types::PersonId;

pub const PERSON_PREFIX: &str = "person:";
pub const IMAGE_PREFIX: &str = "img:";
pub const NOTE_PREFIX: &str = "note:";
pub const NEXT_PERSON_KEY: &str = "meta:next_person";
pub const NEXT_SEQ_KEY: &str = "meta:next_seq";

/// Format: "person:{id}"
pub fn person_key(id: PersonId) -> String {
    format!("{PERSON_PREFIX}{id:020}")
}

/// Format: "img:{id}:{seq}"
pub fn image_key(id: PersonId, seq: u64) -> String {
    format!("{IMAGE_PREFIX}{id:020}:{seq:020}")
}

/// Format: "img:{id}:"
pub fn image_prefix(id: PersonId) -> String {
    format!("{IMAGE_PREFIX}{id:020}:")
}

/// Format: "note:{id}:{seq}"
pub fn note_key(id: PersonId, seq: u64) -> String {
    format!("{NOTE_PREFIX}{id:020}:{seq:020}")
}

/// Format: "note:{id}:"
pub fn note_prefix(id: PersonId) -> String {
    format!("{NOTE_PREFIX}{id:020}:")
}

/// Parses the owner id and sequence out of an "img:{id}:{seq}" key.
pub fn parse_image_key(key: &str) -> Option<(PersonId, u64)> {
    let rest = key.strip_prefix(IMAGE_PREFIX)?;
    let (id, seq) = rest.split_once(':')?;
    Some((id.parse().ok()?, seq.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_key_round_trips() {
        let key = image_key(7, 42);
        assert_eq!(key, "img:00000000000000000007:00000000000000000042");
        assert_eq!(parse_image_key(&key), Some((7, 42)));
    }

    #[test]
    fn keys_sort_numerically() {
        assert!(person_key(9) < person_key(10));
        assert!(image_key(1, 99) < image_key(2, 1));
        assert!(note_key(3, 9) < note_key(3, 10));
    }

    #[test]
    fn prefixes_do_not_overlap_neighbours() {
        assert!(!image_key(11, 1).starts_with(&image_prefix(1)));
        assert!(note_key(1, 5).starts_with(&note_prefix(1)));
    }

    #[test]
    fn parse_rejects_foreign_keys() {
        assert_eq!(parse_image_key("note:1:2"), None);
        assert_eq!(parse_image_key("img:abc:2"), None);
    }
}
