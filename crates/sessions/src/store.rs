//! Generic write-through JSON map keyed by normalized sender.

use std::{
    collections::HashSet,
    fmt, fs,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use {
    clirelay_common::normalize_sender,
    serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{DeserializeOwned, MapAccess, Visitor},
    },
    tracing::{debug, info, warn},
};

use crate::error::{Context, Result};

/// Map a raw sender identity to the key it is stored under.
///
/// Identities without a single digit keep their raw form so they still get a
/// stable slot of their own.
pub fn store_key(raw: &str) -> String {
    let key = normalize_sender(raw);
    if key.is_empty() {
        raw.to_string()
    } else {
        key
    }
}

/// Entries in insertion order. Serialized as a plain JSON object.
///
/// Overwriting an existing key keeps its original position.
#[derive(Debug, Clone, PartialEq)]
pub struct Entries<V>(Vec<(String, V)>);

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> Entries<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: String, value: V) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop the oldest entries until at most `n` remain.
    pub fn keep_last(&mut self, n: usize) {
        let excess = self.0.len().saturating_sub(n);
        self.0.drain(..excess);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl<V: Serialize> Serialize for Entries<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object keyed by sender")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Entries::default();
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.insert(key, value);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// JSON file-backed map from normalized sender to `V`.
///
/// Loaded once at construction; every mutation rewrites the whole file
/// before returning. Load and save failures are logged and never surface to
/// callers: a broken file means an empty store, a failed save means the value
/// only lives in memory for the rest of the process.
pub struct JsonStore<V> {
    path: PathBuf,
    entries: Mutex<Entries<V>>,
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Open the store at `path`, migrating legacy keys on the way in.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, sender: &str) -> Option<V> {
        self.lock().get(&store_key(sender)).cloned()
    }

    pub fn set(&self, sender: &str, value: V) {
        let mut entries = self.lock();
        entries.insert(store_key(sender), value);
        self.save(&entries);
    }

    /// Remove the sender's entry. Returns whether anything was removed; the
    /// file is only rewritten in that case.
    pub fn delete(&self, sender: &str) -> bool {
        let mut entries = self.lock();
        let removed = entries.remove(&store_key(sender)).is_some();
        if removed {
            self.save(&entries);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stored keys, oldest insertion first.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().map(str::to_string).collect()
    }

    /// Mutate the entries under the lock; persists when `f` reports a change.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Entries<V>) -> (R, bool)) -> R {
        let mut entries = self.lock();
        let (out, changed) = f(&mut entries);
        if changed {
            self.save(&entries);
        }
        out
    }

    fn save(&self, entries: &Entries<V>) {
        if let Err(e) = persist(&self.path, entries) {
            warn!(path = %self.path.display(), error = %e, "store save failed");
        }
    }

    // Never held across an await point; the lock only guards in-memory edits
    // and the synchronous file write.
    fn lock(&self) -> MutexGuard<'_, Entries<V>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Atomic write: serialize to a temp file, then rename over the target.
fn persist<V: Serialize>(path: &Path, entries: &Entries<V>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes())
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn read_entries<V: DeserializeOwned>(path: &Path) -> Result<Entries<V>> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn load_entries<V>(path: &Path) -> Entries<V>
where
    V: Serialize + DeserializeOwned,
{
    if !path.exists() {
        debug!(path = %path.display(), "no store file, starting empty");
        return Entries::default();
    }

    let raw = match read_entries(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store load failed, starting fresh");
            return Entries::default();
        },
    };

    let (entries, migrated) = normalize_keys(raw);
    if migrated {
        match persist(path, &entries) {
            Ok(()) => info!(
                path = %path.display(),
                count = entries.len(),
                "migrated store: normalized sender keys"
            ),
            Err(e) => warn!(path = %path.display(), error = %e, "store migration save failed"),
        }
    }
    entries
}

/// Re-key every entry through [`store_key`].
///
/// An entry already stored under its normalized key wins over any legacy
/// entry that normalizes to the same key, wherever it sits in the file.
fn normalize_keys<V>(raw: Entries<V>) -> (Entries<V>, bool) {
    let canonical: HashSet<String> = raw
        .keys()
        .filter(|k| store_key(k) == *k)
        .map(str::to_string)
        .collect();

    let mut migrated = false;
    let mut out = Entries::default();
    for (key, value) in raw.0 {
        let normalized = store_key(&key);
        if normalized == key {
            out.insert(key, value);
            continue;
        }
        migrated = true;
        if !canonical.contains(&normalized) {
            out.insert(normalized, value);
        }
    }
    (out, migrated)
}
