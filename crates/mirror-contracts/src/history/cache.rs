use std::sync::Mutex;

use super::entry::HistoryEntry;
use super::store::SlotStore;

pub const HISTORY_SLOT_KEY: &str = "mirror_ai_history_v1";
pub const HISTORY_CAPACITY: usize = 10;

/// Newest-first record of past generations, bounded to
/// [`HISTORY_CAPACITY`] entries.
///
/// Every operation is fail-soft: storage errors are logged and swallowed, and
/// an unreadable slot lists as empty.
pub struct HistoryCache {
    store: Box<dyn SlotStore>,
    key: String,
    capacity: usize,
    lock: Mutex<()>,
}

impl HistoryCache {
    pub fn new(store: Box<dyn SlotStore>) -> Self {
        Self::with_capacity(store, HISTORY_CAPACITY)
    }

    pub fn with_capacity(store: Box<dyn SlotStore>, capacity: usize) -> Self {
        Self {
            store,
            key: HISTORY_SLOT_KEY.to_string(),
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Vec<HistoryEntry> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.read_entries()
    }

    /// Looks an entry up by id. Unreadable history finds nothing.
    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.list().into_iter().find(|entry| entry.id == id)
    }

    /// Prepends `entry` and evicts anything past capacity.
    pub fn append(&self, entry: HistoryEntry) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries = self.read_entries();
        entries.insert(0, entry);
        entries.truncate(self.capacity);

        let encoded = match serde_json::to_string(&entries) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!("failed to encode history: {err}");
                return;
            }
        };
        if let Err(err) = self.store.write(&self.key, &encoded) {
            tracing::error!(
                entries = entries.len(),
                "failed to save history (storage may be full): {err:#}"
            );
        }
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = self.store.remove(&self.key) {
            tracing::error!("failed to clear history: {err:#}");
        }
    }

    fn read_entries(&self) -> Vec<HistoryEntry> {
        let raw = match self.store.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::error!("failed to read history: {err:#}");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!("history slot is corrupt, treating as empty: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryCache, HISTORY_SLOT_KEY};
    use crate::history::{HistoryEntry, JsonFileStore, MemoryStore};

    fn entry(n: usize) -> HistoryEntry {
        let mut entry = HistoryEntry::new(
            format!("person-{n}.png"),
            format!("garment-{n}.png"),
            format!("data:image/png;base64,{n}"),
            "",
            "Flash fast preview",
        );
        entry.id = format!("entry-{n}");
        entry
    }

    fn ids(entries: &[HistoryEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.id.clone()).collect()
    }

    #[test]
    fn append_keeps_ten_most_recent_newest_first() {
        let cache = HistoryCache::new(Box::new(MemoryStore::new()));
        for n in 1..=11 {
            cache.append(entry(n));
        }
        let listed = cache.list();
        assert_eq!(listed.len(), 10);
        let expected: Vec<String> = (2..=11).rev().map(|n| format!("entry-{n}")).collect();
        assert_eq!(ids(&listed), expected);
    }

    #[test]
    fn clear_then_list_is_empty() {
        let cache = HistoryCache::new(Box::new(MemoryStore::new()));
        cache.append(entry(1));
        cache.clear();
        assert!(cache.list().is_empty());
    }

    #[test]
    fn list_is_idempotent() {
        let cache = HistoryCache::new(Box::new(MemoryStore::new()));
        cache.append(entry(1));
        cache.append(entry(2));
        assert_eq!(cache.list(), cache.list());
    }

    #[test]
    fn corrupt_slot_lists_empty_and_is_overwritten_by_append() {
        let store = MemoryStore::new();
        store.insert_raw(HISTORY_SLOT_KEY, "{\"oops\":");
        let cache = HistoryCache::new(Box::new(store));
        assert!(cache.list().is_empty());

        cache.append(entry(1));
        assert_eq!(ids(&cache.list()), vec!["entry-1"]);
    }

    #[test]
    fn failed_write_is_swallowed_and_keeps_previous_history() {
        let cache = HistoryCache::new(Box::new(MemoryStore::with_quota(600)));
        cache.append(entry(1));
        assert_eq!(cache.list().len(), 1);

        let mut huge = entry(2);
        huge.result_image = "x".repeat(4096);
        cache.append(huge);
        assert_eq!(ids(&cache.list()), vec!["entry-1"]);
    }

    #[test]
    fn file_backed_history_survives_reopen() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("history.json");
        let cache = HistoryCache::new(Box::new(JsonFileStore::new(&path)));
        cache.append(entry(1));
        cache.append(entry(2));

        let reopened = HistoryCache::new(Box::new(JsonFileStore::new(&path)));
        assert_eq!(ids(&reopened.list()), vec!["entry-2", "entry-1"]);

        std::fs::write(&path, "garbage")?;
        assert!(reopened.list().is_empty());
        Ok(())
    }

    #[test]
    fn get_finds_entries_by_id() {
        let cache = HistoryCache::new(Box::new(MemoryStore::new()));
        cache.append(entry(1));
        cache.append(entry(2));
        assert_eq!(cache.get("entry-1").map(|found| found.garment_preview), Some("garment-1.png".to_string()));
        assert!(cache.get("entry-3").is_none());

        for n in 3..=12 {
            cache.append(entry(n));
        }
        assert!(cache.get("entry-2").is_none());
        assert!(cache.get("entry-12").is_some());
    }
}
