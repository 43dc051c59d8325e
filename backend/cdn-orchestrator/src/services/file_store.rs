/// In-memory authoritative file table
///
/// Records are keyed by id with a secondary content-hash index. Writers
/// mutate through [`FileStore::update`] so each read-modify-write happens
/// under the record's shard lock.
use crate::models::DistributedFile;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct FileStore {
    files: DashMap<Uuid, DistributedFile>,
    by_hash: DashMap<String, Uuid>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<DistributedFile> {
        self.files.get(id).map(|f| f.clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.files.contains_key(id)
    }

    pub fn find_by_hash(&self, content_hash: &str) -> Option<Uuid> {
        self.by_hash.get(content_hash).map(|id| *id)
    }

    /// Insert a new record unless another one with the same hash won the race.
    /// Returns the record that is stored under the hash and whether it is the
    /// one passed in.
    pub fn insert_new(&self, file: DistributedFile) -> (DistributedFile, bool) {
        match self.by_hash.entry(file.content_hash.clone()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                drop(existing);
                match self.get(&id) {
                    Some(stored) => (stored, false),
                    None => {
                        self.by_hash.insert(file.content_hash.clone(), file.id);
                        self.files.insert(file.id, file.clone());
                        (file, true)
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(file.id);
                self.files.insert(file.id, file.clone());
                (file, true)
            }
        }
    }

    /// Apply `f` to a record in place and return its result
    pub fn update<F, R>(&self, id: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut DistributedFile) -> R,
    {
        self.files.get_mut(id).map(|mut file| f(&mut file))
    }

    pub fn all(&self) -> Vec<DistributedFile> {
        self.files.iter().map(|f| f.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
