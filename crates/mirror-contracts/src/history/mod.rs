mod cache;
mod entry;
mod store;

pub use cache::{HistoryCache, HISTORY_CAPACITY, HISTORY_SLOT_KEY};
pub use entry::HistoryEntry;
pub use store::{JsonFileStore, MemoryStore, SlotStore};
