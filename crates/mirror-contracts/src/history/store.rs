use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use serde_json::{Map, Value};

/// Keyed string slots backing local persistence.
pub trait SlotStore: Send + Sync {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Slots stored as string members of one JSON object on disk.
///
/// Each write re-reads the file and only replaces its own key, so two stores
/// sharing a path do not clobber each other's slots.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        apply(&mut on_disk);
        write_json_object(&self.path, &on_disk)
    }
}

impl SlotStore for JsonFileStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
        let Some(object) = parsed.as_object() else {
            bail!("{} does not hold a JSON object", self.path.display());
        };
        Ok(object.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|slots| {
            slots.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|slots| {
            slots.remove(key);
        })
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(
        &tmp_path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

/// In-memory slots with an optional total byte quota, mirroring a browser
/// storage area that rejects writes once full.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Stores `value` without quota checks, e.g. to seed a corrupted slot.
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(key.to_string(), value.to_string());
        }
    }
}

impl SlotStore for MemoryStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(slots.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = slots
                .iter()
                .filter(|(slot, _)| slot.as_str() != key)
                .map(|(slot, stored)| slot.len() + stored.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                bail!("storage quota exceeded ({needed} > {quota} bytes)");
            }
        }
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        slots.remove(key);
        Ok(())
    }
}
