//! 会话持久化：带版本号的记录，旧版本直接丢弃（不做迁移）。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::session::{partition, IntegrityError, SessionState};

pub const SCHEMA_VERSION: u32 = 3;

/// The single record kept under the storage key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedRecord {
    pub schema_version: u32,
    #[serde(flatten)]
    pub state: SessionState,
}

impl PersistedRecord {
    pub fn current(state: SessionState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum PersistError {
    #[error("stored schema version {found} is not supported (current {supported})")]
    SchemaIncompatible { found: u32, supported: u32 },
    #[error("stored record is malformed: {message}")]
    Malformed { message: String },
    #[error("stored record breaks an invariant: {error}")]
    Invalid { error: IntegrityError },
    #[error("storage unavailable: {message}")]
    Storage { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum LoadOutcome {
    /// Nothing was stored under the key.
    Fresh,
    Restored,
    /// The stored record was dropped and replaced with the intro default.
    Reset { reason: PersistError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub state: SessionState,
    pub outcome: LoadOutcome,
}

pub fn encode(state: &SessionState) -> Result<String, PersistError> {
    serde_json::to_string(&PersistedRecord::current(state.clone())).map_err(|error| {
        PersistError::Malformed {
            message: error.to_string(),
        }
    })
}

/// Parses a stored record. Records from any other schema version are refused
/// before their body is interpreted.
pub fn decode(catalog: &Catalog, raw: &str) -> Result<SessionState, PersistError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(malformed)?;
    let found = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    if found != u64::from(SCHEMA_VERSION) {
        return Err(PersistError::SchemaIncompatible {
            found: u32::try_from(found).unwrap_or(u32::MAX),
            supported: SCHEMA_VERSION,
        });
    }

    let record: PersistedRecord = serde_json::from_value(value).map_err(malformed)?;
    partition::check_state(catalog, &record.state)
        .map_err(|error| PersistError::Invalid { error })?;
    Ok(record.state)
}

fn malformed(error: serde_json::Error) -> PersistError {
    PersistError::Malformed {
        message: error.to_string(),
    }
}

/// 存储后端。浏览器中是 localStorage，测试中是内存表。
pub trait SessionStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub struct LocalStorageStore {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    pub fn new() -> Result<Self, PersistError> {
        let storage = web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten())
            .ok_or_else(|| PersistError::Storage {
                message: "localStorage is not available".into(),
            })?;
        Ok(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
fn storage_error(error: wasm_bindgen::JsValue) -> PersistError {
    PersistError::Storage {
        message: error
            .as_string()
            .unwrap_or_else(|| format!("{error:?}")),
    }
}

#[cfg(target_arch = "wasm32")]
impl SessionStore for LocalStorageStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.storage.get_item(key).map_err(storage_error)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.storage.set_item(key, value).map_err(storage_error)
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.storage.remove_item(key).map_err(storage_error)
    }
}

pub fn save<S: SessionStore + ?Sized>(
    store: &mut S,
    key: &str,
    state: &SessionState,
) -> Result<(), PersistError> {
    let encoded = encode(state)?;
    store.write(key, &encoded)?;
    debug!(key, phase = %state.phase, "session saved");
    Ok(())
}

/// Loads the stored session. Anything that cannot be restored as-is is
/// replaced by the intro default, and the default is written back.
pub fn load<S: SessionStore + ?Sized>(store: &mut S, key: &str, catalog: &Catalog) -> Loaded {
    let raw = match store.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            return Loaded {
                state: SessionState::default(),
                outcome: LoadOutcome::Fresh,
            }
        }
        Err(reason) => return reset(store, key, reason),
    };

    match decode(catalog, &raw) {
        Ok(state) => {
            debug!(key, phase = %state.phase, "session restored");
            Loaded {
                state,
                outcome: LoadOutcome::Restored,
            }
        }
        Err(reason) => reset(store, key, reason),
    }
}

fn reset<S: SessionStore + ?Sized>(store: &mut S, key: &str, reason: PersistError) -> Loaded {
    warn!(key, %reason, "discarding stored session");
    let state = SessionState::default();
    if let Err(error) = save(store, key, &state) {
        warn!(key, %error, "could not overwrite discarded session");
    }
    Loaded {
        state,
        outcome: LoadOutcome::Reset { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, DEFAULT_STORAGE_KEY};
    use crate::session::{Bucket, Phase, Session};

    fn triage_session() -> Session {
        let mut session = Session::new(&SessionConfig::default().with_seed(8));
        session.begin().expect("begin should succeed");
        session
            .classify("family", Bucket::High)
            .expect("classify should succeed");
        session
            .classify("wealth", Bucket::Low)
            .expect("classify should succeed");
        session
    }

    #[test]
    fn saved_session_is_restored_verbatim() {
        let session = triage_session();
        let mut store = MemoryStore::new();
        save(&mut store, DEFAULT_STORAGE_KEY, session.state()).expect("save should succeed");

        let raw = store
            .read(DEFAULT_STORAGE_KEY)
            .expect("read should succeed")
            .expect("record should exist");
        assert!(raw.contains(r#""schema_version":3"#));

        let loaded = load(&mut store, DEFAULT_STORAGE_KEY, session.catalog());
        assert_eq!(loaded.outcome, LoadOutcome::Restored);
        assert_eq!(&loaded.state, session.state());
    }

    #[test]
    fn missing_record_starts_fresh() {
        let mut store = MemoryStore::new();
        let loaded = load(&mut store, "nothing-here", &Catalog::standard());
        assert_eq!(loaded.outcome, LoadOutcome::Fresh);
        assert_eq!(loaded.state.phase, Phase::Intro);
    }

    #[test]
    fn older_schema_is_dropped_not_migrated() {
        let session = triage_session();
        let mut record = PersistedRecord::current(session.state().clone());
        record.schema_version = 2;
        let mut store = MemoryStore::new();
        store
            .write(
                DEFAULT_STORAGE_KEY,
                &serde_json::to_string(&record).expect("record should serialize"),
            )
            .expect("write should succeed");

        let loaded = load(&mut store, DEFAULT_STORAGE_KEY, session.catalog());
        assert_eq!(
            loaded.outcome,
            LoadOutcome::Reset {
                reason: PersistError::SchemaIncompatible {
                    found: 2,
                    supported: SCHEMA_VERSION
                }
            }
        );
        assert_eq!(loaded.state, SessionState::default());

        let rewritten = load(&mut store, DEFAULT_STORAGE_KEY, session.catalog());
        assert_eq!(rewritten.outcome, LoadOutcome::Restored, "default is written back");
    }

    #[test]
    fn legacy_shape_without_version_is_dropped() {
        let mut store = MemoryStore::new();
        store
            .write(DEFAULT_STORAGE_KEY, r#"{"phase":"sort","unsortedCards":[]}"#)
            .expect("write should succeed");
        let loaded = load(&mut store, DEFAULT_STORAGE_KEY, &Catalog::standard());
        assert!(matches!(
            loaded.outcome,
            LoadOutcome::Reset {
                reason: PersistError::SchemaIncompatible { found: 0, .. }
            }
        ));
    }

    #[test]
    fn current_version_with_broken_partition_is_dropped() {
        let session = triage_session();
        let mut state = session.state().clone();
        state.deck.pop();
        let mut store = MemoryStore::new();
        let raw = serde_json::to_string(&PersistedRecord::current(state)).expect("serialize");
        store.write(DEFAULT_STORAGE_KEY, &raw).expect("write should succeed");

        let loaded = load(&mut store, DEFAULT_STORAGE_KEY, session.catalog());
        assert!(matches!(
            loaded.outcome,
            LoadOutcome::Reset {
                reason: PersistError::Invalid { .. }
            }
        ));
        assert_eq!(loaded.state.phase, Phase::Intro);
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        assert!(matches!(
            decode(&Catalog::standard(), "not json"),
            Err(PersistError::Malformed { .. })
        ));
    }
}
