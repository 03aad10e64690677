//! Content-hash deduplication index
//!
//! Maps a body hash to the id of the first page that produced it. Entries
//! added during a write batch are staged and only become visible to later
//! batches once that batch commits.

use std::collections::HashMap;

/// In-memory hash -> first page id map, owned by the write worker
#[derive(Debug, Default)]
pub struct DedupIndex {
    committed: HashMap<String, i64>,
    staged: HashMap<String, i64>,
}

impl DedupIndex {
    /// Creates an index hydrated from persisted Content rows
    pub fn new(committed: HashMap<String, i64>) -> Self {
        Self {
            committed,
            staged: HashMap::new(),
        }
    }

    /// Returns the page that owns `hash`, including pages of the open batch
    pub fn lookup(&self, hash: &str) -> Option<i64> {
        self.staged
            .get(hash)
            .or_else(|| self.committed.get(hash))
            .copied()
    }

    /// Records `page_id` as the owner of `hash` within the open batch
    ///
    /// Returns false and leaves the index unchanged if the hash is owned.
    pub fn stage(&mut self, hash: &str, page_id: i64) -> bool {
        if self.lookup(hash).is_some() {
            return false;
        }
        self.staged.insert(hash.to_string(), page_id);
        true
    }

    /// Makes staged entries permanent after a successful commit
    pub fn commit(&mut self) {
        self.committed.extend(self.staged.drain());
    }

    /// Forgets staged entries after a rolled back batch
    pub fn discard(&mut self) {
        self.staged.clear();
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_owner_wins() {
        let mut index = DedupIndex::default();
        assert!(index.stage("h1", 1));
        assert!(!index.stage("h1", 2));
        assert_eq!(index.lookup("h1"), Some(1));
    }

    #[test]
    fn test_commit_and_discard() {
        let mut index = DedupIndex::new(HashMap::from([("old".to_string(), 7)]));
        index.stage("a", 8);
        index.commit();
        index.stage("b", 9);
        index.discard();

        assert_eq!(index.lookup("old"), Some(7));
        assert_eq!(index.lookup("a"), Some(8));
        assert_eq!(index.lookup("b"), None);
        assert_eq!(index.len(), 2);
    }
}
