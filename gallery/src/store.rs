use std::path::Path;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::GalleryError;
use crate::keys::{
    image_key, image_prefix, note_key, note_prefix, parse_image_key, person_key,
    IMAGE_PREFIX, NEXT_PERSON_KEY, NEXT_SEQ_KEY, PERSON_PREFIX,
};
use crate::kv::{KVError, KVStore};
use crate::memory::MemoryStore;
use crate::redb_store::RedbStore;
use crate::types::{Annotation, GalleryImage, ImageRef, Person, PersonId, PersonRecord};

type Result<T> = std::result::Result<T, GalleryError>;

/// Maps people to their reference photos and annotations.
///
/// Reads go straight to the underlying [`KVStore`]. Writes are serialized
/// so id and sequence allocation never race, and each logical write (a
/// whole enrollment, one image, one annotation) is a single atomic batch:
/// a concurrent [`GalleryStore::gallery`] scan sees a person with all of
/// their enrollment photos or not at all.
pub struct GalleryStore {
    kv: Box<dyn KVStore>,
    writer: Mutex<()>,
}

impl GalleryStore {
    pub fn new(kv: Box<dyn KVStore>) -> Self {
        Self {
            kv,
            writer: Mutex::new(()),
        }
    }

    /// Creates a store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Opens or creates a redb-backed store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Box::new(RedbStore::open(path)?)))
    }

    /// Creates a person with no photos. Returns the new id.
    pub fn add_person(&self, name: &str) -> Result<PersonId> {
        let no_images: [&[u8]; 0] = [];
        self.insert_person(name, &no_images)
    }

    /// Creates a person together with their reference photos in one
    /// atomic write.
    pub fn enroll<B: AsRef<[u8]>>(&self, name: &str, images: &[B]) -> Result<PersonId> {
        if images.is_empty() {
            return Err(GalleryError::NoImages);
        }
        self.insert_person(name, images)
    }

    fn insert_person<B: AsRef<[u8]>>(&self, name: &str, images: &[B]) -> Result<PersonId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GalleryError::EmptyName);
        }
        if let Some(i) = images.iter().position(|b| b.as_ref().is_empty()) {
            return Err(GalleryError::EmptyImage(i));
        }

        let _guard = self.writer.lock();

        let id = self.read_counter(NEXT_PERSON_KEY)? + 1;
        let mut seq = self.read_counter(NEXT_SEQ_KEY)?;

        let person = Person {
            id,
            name: name.to_string(),
        };
        let person_bytes = encode(&person)?;
        let id_bytes = id.to_string();

        let mut keys = Vec::with_capacity(images.len());
        for _ in images {
            seq += 1;
            keys.push(image_key(id, seq));
        }
        let seq_bytes = seq.to_string();
        let person_key = person_key(id);

        let mut entries: Vec<(&str, &[u8])> = Vec::with_capacity(images.len() + 3);
        entries.push((person_key.as_str(), person_bytes.as_slice()));
        for (key, image) in keys.iter().zip(images) {
            entries.push((key.as_str(), image.as_ref()));
        }
        entries.push((NEXT_PERSON_KEY, id_bytes.as_bytes()));
        entries.push((NEXT_SEQ_KEY, seq_bytes.as_bytes()));
        self.kv.batch_set(&entries)?;

        debug!(person_id = id, images = images.len(), "gallery: enrolled");
        Ok(id)
    }

    /// Appends a reference photo to an existing person.
    pub fn add_image(&self, id: PersonId, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(GalleryError::EmptyImage(0));
        }
        let _guard = self.writer.lock();
        self.person(id)?;

        let seq = self.read_counter(NEXT_SEQ_KEY)? + 1;
        let key = image_key(id, seq);
        let seq_bytes = seq.to_string();
        self.kv
            .batch_set(&[(key.as_str(), bytes), (NEXT_SEQ_KEY, seq_bytes.as_bytes())])?;
        Ok(())
    }

    /// Appends an annotation to an existing person.
    pub fn add_annotation(&self, id: PersonId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(GalleryError::EmptyText);
        }
        let _guard = self.writer.lock();
        self.person(id)?;

        let seq = self.read_counter(NEXT_SEQ_KEY)? + 1;
        let key = note_key(id, seq);
        let note = encode(&Annotation {
            owner_id: id,
            text: text.to_string(),
        })?;
        let seq_bytes = seq.to_string();
        self.kv.batch_set(&[
            (key.as_str(), note.as_slice()),
            (NEXT_SEQ_KEY, seq_bytes.as_bytes()),
        ])?;
        Ok(())
    }

    /// Returns the person with the given id.
    pub fn person(&self, id: PersonId) -> Result<Person> {
        let key = person_key(id);
        match self.kv.get(&key)? {
            Some(bytes) => decode(&key, &bytes),
            None => Err(GalleryError::NotFound(id)),
        }
    }

    /// Returns every person in enrollment order.
    pub fn list_people(&self) -> Result<Vec<Person>> {
        self.kv
            .scan(PERSON_PREFIX)?
            .into_iter()
            .map(|(key, bytes)| decode(&key, &bytes))
            .collect()
    }

    /// Returns the reference photos of one person.
    pub fn images_of(&self, id: PersonId) -> Result<Vec<GalleryImage>> {
        self.person(id)?;
        self.scan_images(&image_prefix(id))
    }

    /// Returns the annotations of one person in insertion order.
    pub fn annotations_of(&self, id: PersonId) -> Result<Vec<String>> {
        self.person(id)?;
        self.kv
            .scan(&note_prefix(id))?
            .into_iter()
            .map(|(key, bytes)| decode::<Annotation>(&key, &bytes).map(|a| a.text))
            .collect()
    }

    /// Returns every person with their annotations.
    pub fn people_with_annotations(&self) -> Result<Vec<PersonRecord>> {
        self.list_people()?
            .into_iter()
            .map(|p| {
                let annotations = self.annotations_of(p.id)?;
                Ok(PersonRecord {
                    id: p.id,
                    name: p.name,
                    annotations,
                })
            })
            .collect()
    }

    /// Returns a snapshot of every reference photo, ordered by owner
    /// enrollment and then by photo sequence.
    pub fn gallery(&self) -> Result<Vec<GalleryImage>> {
        self.scan_images(IMAGE_PREFIX)
    }

    /// Same order as [`GalleryStore::gallery`], without reading image bytes.
    pub fn image_refs(&self) -> Result<Vec<ImageRef>> {
        self.kv
            .scan_keys(IMAGE_PREFIX)?
            .into_iter()
            .map(|key| {
                let (owner_id, seq) = parse_image_key(&key).ok_or_else(|| malformed_key(&key))?;
                Ok(ImageRef { owner_id, seq })
            })
            .collect()
    }

    /// Returns the bytes of one reference photo.
    pub fn image(&self, image: ImageRef) -> Result<Vec<u8>> {
        let key = image_key(image.owner_id, image.seq);
        self.kv.get(&key)?.ok_or_else(|| GalleryError::Corrupt {
            key,
            reason: "image listed but missing".to_string(),
        })
    }

    fn scan_images(&self, prefix: &str) -> Result<Vec<GalleryImage>> {
        self.kv
            .scan(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                let (owner_id, seq) = parse_image_key(&key).ok_or_else(|| malformed_key(&key))?;
                Ok(GalleryImage {
                    owner_id,
                    seq,
                    bytes,
                })
            })
            .collect()
    }

    fn read_counter(&self, key: &str) -> Result<u64> {
        let Some(bytes) = self.kv.get(key)? else {
            return Ok(0);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GalleryError::Corrupt {
                key: key.to_string(),
                reason: "counter is not a number".to_string(),
            })
    }
}

fn malformed_key(key: &str) -> GalleryError {
    GalleryError::Corrupt {
        key: key.to_string(),
        reason: "malformed image key".to_string(),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| GalleryError::Storage(KVError::Serialization(e.to_string())))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(|e| GalleryError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn enroll_assigns_increasing_ids() {
        let store = GalleryStore::in_memory();
        let alice = store.enroll("Alice", &[b"a1".to_vec()]).unwrap();
        let bob = store.enroll("Bob", &[b"b1".to_vec(), b"b2".to_vec()]).unwrap();
        assert_eq!(alice, 1);
        assert_eq!(bob, 2);

        let people = store.list_people().unwrap();
        assert_eq!(
            people,
            vec![
                Person { id: 1, name: "Alice".into() },
                Person { id: 2, name: "Bob".into() },
            ]
        );
    }

    #[test]
    fn enroll_rejects_invalid_input() {
        let store = GalleryStore::in_memory();
        assert!(matches!(
            store.enroll("  ", &[b"x".to_vec()]),
            Err(GalleryError::EmptyName)
        ));
        let none: [Vec<u8>; 0] = [];
        assert!(matches!(store.enroll("Alice", &none), Err(GalleryError::NoImages)));
        assert!(matches!(
            store.enroll("Alice", &[b"x".to_vec(), Vec::new()]),
            Err(GalleryError::EmptyImage(1))
        ));
        assert!(store.list_people().unwrap().is_empty());
    }

    #[test]
    fn images_of_unknown_person_is_not_found() {
        let store = GalleryStore::in_memory();
        assert!(matches!(store.images_of(42), Err(GalleryError::NotFound(42))));
        assert!(matches!(
            store.add_annotation(42, "hi"),
            Err(GalleryError::NotFound(42))
        ));
        assert!(matches!(
            store.add_image(42, b"x"),
            Err(GalleryError::NotFound(42))
        ));
    }

    #[test]
    fn annotations_keep_insertion_order() {
        let store = GalleryStore::in_memory();
        let id = store.add_person("Alice").unwrap();
        assert!(store.annotations_of(id).unwrap().is_empty());

        for text in ["loud laugh", "always late", "puns"] {
            store.add_annotation(id, text).unwrap();
        }
        assert_eq!(
            store.annotations_of(id).unwrap(),
            vec!["loud laugh", "always late", "puns"]
        );
        assert!(matches!(store.add_annotation(id, " "), Err(GalleryError::EmptyText)));
    }

    #[test]
    fn gallery_is_in_enrollment_order() {
        let store = GalleryStore::in_memory();
        let a = store.enroll("A", &[b"a1".to_vec(), b"a2".to_vec()]).unwrap();
        let b = store.enroll("B", &[b"b1".to_vec()]).unwrap();
        store.add_image(a, b"a3").unwrap();

        let owners: Vec<(PersonId, Vec<u8>)> = store
            .gallery()
            .unwrap()
            .into_iter()
            .map(|img| (img.owner_id, img.bytes))
            .collect();
        assert_eq!(
            owners,
            vec![
                (a, b"a1".to_vec()),
                (a, b"a2".to_vec()),
                (a, b"a3".to_vec()),
                (b, b"b1".to_vec()),
            ]
        );
        assert_eq!(store.images_of(b).unwrap().len(), 1);

        let refs = store.image_refs().unwrap();
        let from_snapshot: Vec<ImageRef> =
            store.gallery().unwrap().iter().map(GalleryImage::image_ref).collect();
        assert_eq!(refs, from_snapshot);
        assert_eq!(store.image(refs[3]).unwrap(), b"b1".to_vec());
        assert!(matches!(
            store.image(ImageRef { owner_id: b, seq: 99 }),
            Err(GalleryError::Corrupt { .. })
        ));
    }

    #[test]
    fn people_with_annotations_joins_records() {
        let store = GalleryStore::in_memory();
        let id = store.enroll("Alice", &[b"a".to_vec()]).unwrap();
        store.add_annotation(id, "loud laugh").unwrap();
        store.add_person("Bob").unwrap();

        let records = store.people_with_annotations().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].annotations, vec!["loud laugh"]);
        assert!(records[1].annotations.is_empty());
    }

    #[test]
    fn concurrent_enrollment_is_never_torn() {
        let store = Arc::new(GalleryStore::in_memory());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let photos = vec![vec![w as u8, i as u8, 1], vec![w as u8, i as u8, 2]];
                        store.enroll(&format!("p{w}-{i}"), &photos).unwrap();
                    }
                })
            })
            .collect();

        // Every snapshot taken mid-enrollment holds whole people only.
        for _ in 0..50 {
            let images = store.gallery().unwrap();
            assert_eq!(images.len() % 2, 0);
        }
        for w in writers {
            w.join().unwrap();
        }

        let people = store.list_people().unwrap();
        assert_eq!(people.len(), 100);
        let mut ids: Vec<PersonId> = people.iter().map(|p| p.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn redb_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.redb");
        {
            let store = GalleryStore::open(&path).unwrap();
            let id = store.enroll("Alice", &[b"img".to_vec()]).unwrap();
            store.add_annotation(id, "loud laugh").unwrap();
        }
        let store = GalleryStore::open(&path).unwrap();
        assert_eq!(store.person(1).unwrap().name, "Alice");
        assert_eq!(store.annotations_of(1).unwrap(), vec!["loud laugh"]);
        assert_eq!(store.enroll("Bob", &[b"img".to_vec()]).unwrap(), 2);
    }
}
