// Persistent key-value state store.
//
// The installation keeps its song state in a host-provided store that maps
// string keys to JSON-compatible values. `StateStore` is the capability the
// engine needs from it: fetch a value (possibly absent) and store a value.
// `MemoryStore` backs tests and the simulator; `JsonFileStore` keeps the same
// map in a single JSON object on disk and writes it out on `flush()`.
//
// `SongState::load_from()` reads each field under its own key and falls back
// to the supplied default for a missing key (a store miss is never an error).
// `SongState::commit_to()` writes every field and flushes once; it is the
// only place engine state reaches the store.

use crate::error::Result;
use crate::state::SongState;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const KEY: &str = "key";
pub const SCALE_MODE: &str = "scale_mode";
pub const CHORD: &str = "chord";
pub const CHORD_VARIATION: &str = "chord_variation";
pub const CHORD_NOTES: &str = "chord_notes";
pub const CURRENT_SCENE: &str = "current_scene";
pub const ACTIVE_MELODY: &str = "active_melody";
pub const TIMERS: &str = "timers";
pub const INSTRUMENTS: &str = "instruments";

/// Every key `SongState` is persisted under.
pub const STATE_KEYS: [&str; 9] = [
    KEY,
    SCALE_MODE,
    CHORD,
    CHORD_VARIATION,
    CHORD_NOTES,
    CURRENT_SCENE,
    ACTIVE_MELODY,
    TIMERS,
    INSTRUMENTS,
];

pub trait StateStore {
    fn fetch(&self, key: &str) -> Result<Option<Value>>;
    fn store(&mut self, key: &str, value: Value) -> Result<()>;

    /// Make stored values durable. No-op for stores without a backing file.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn fetch(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// A store persisted as one JSON object in a file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`, reading existing contents if the file exists.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn fetch(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn fetch_or<T: DeserializeOwned>(store: &impl StateStore, key: &str, default: T) -> Result<T> {
    match store.fetch(key)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(default),
    }
}

fn put<T: Serialize>(store: &mut impl StateStore, key: &str, value: &T) -> Result<()> {
    store.store(key, serde_json::to_value(value)?)
}

impl SongState {
    /// Read the state from `store`, field by field. Missing fields come from
    /// `default`.
    pub fn load_from(store: &impl StateStore, default: SongState) -> Result<SongState> {
        Ok(SongState {
            key: fetch_or(store, KEY, default.key)?,
            scale_mode: fetch_or(store, SCALE_MODE, default.scale_mode)?,
            chord: fetch_or(store, CHORD, default.chord)?,
            chord_variation: fetch_or(store, CHORD_VARIATION, default.chord_variation)?,
            chord_notes: fetch_or(store, CHORD_NOTES, default.chord_notes)?,
            current_scene: fetch_or(store, CURRENT_SCENE, default.current_scene)?,
            active_melody: fetch_or(store, ACTIVE_MELODY, default.active_melody)?,
            timers: fetch_or(store, TIMERS, default.timers)?,
            instruments: fetch_or(store, INSTRUMENTS, default.instruments)?,
        })
    }

    /// Write every field to `store` and flush.
    pub fn commit_to(&self, store: &mut impl StateStore) -> Result<()> {
        put(store, KEY, &self.key)?;
        put(store, SCALE_MODE, &self.scale_mode)?;
        put(store, CHORD, &self.chord)?;
        put(store, CHORD_VARIATION, &self.chord_variation)?;
        put(store, CHORD_NOTES, &self.chord_notes)?;
        put(store, CURRENT_SCENE, &self.current_scene)?;
        put(store, ACTIVE_MELODY, &self.active_melody)?;
        put(store, TIMERS, &self.timers)?;
        put(store, INSTRUMENTS, &self.instruments)?;
        store.flush()
    }
}
