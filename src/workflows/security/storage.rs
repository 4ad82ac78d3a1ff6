use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::answer::Answer;
use super::domain::{AnswerSet, JustificationSet};
use super::state::{WizardAction, WizardState};

pub const NS_FRAMEWORK: &str = "sro:fw";
pub const NS_NOTES: &str = "sro:notes";
pub const NS_CRITERIA: &str = "sro:crit";

/// `<namespace>:<ticketKey>`
pub fn storage_key(namespace: &str, ticket: &str) -> String {
    format!("{namespace}:{ticket}")
}

/// Minimal string key-value backend; last write wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failure for '{key}': {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store mutex poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store mutex poisoned".to_string()))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store mutex poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        fs::write(self.path_for(key), value).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Backend chosen from configuration at startup.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    File(FileStore),
}

impl StoreBackend {
    pub fn from_dir(dir: Option<&Path>) -> Result<Self, StorageError> {
        match dir {
            Some(dir) => Ok(Self::File(FileStore::new(dir)?)),
            None => Ok(Self::Memory(MemoryStore::default())),
        }
    }
}

impl KeyValueStore for StoreBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self {
            StoreBackend::Memory(store) => store.get(key),
            StoreBackend::File(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        match self {
            StoreBackend::Memory(store) => store.set(key, value),
            StoreBackend::File(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self {
            StoreBackend::Memory(store) => store.remove(key),
            StoreBackend::File(store) => store.remove(key),
        }
    }
}

/// Answers and justifications persisted for one criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionBuffers {
    #[serde(rename = "a", default)]
    pub answers: AnswerSet,
    #[serde(rename = "j", default)]
    pub justifications: JustificationSet,
}

/// Fill keys missing from `buffer` with the stored values; present keys always win.
pub fn merge_missing<V: Clone>(
    buffer: &BTreeMap<String, V>,
    stored: BTreeMap<String, V>,
) -> BTreeMap<String, V> {
    let mut merged = stored;
    merged.extend(buffer.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Answers whose stored value no longer normalizes are dropped rather than failing the load.
fn lenient_answers(raw: &Value) -> AnswerSet {
    raw.as_object()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(qid, value)| Answer::normalize(value).map(|answer| (qid.clone(), answer)))
                .collect()
        })
        .unwrap_or_default()
}

fn lenient_justifications(raw: &Value) -> JustificationSet {
    raw.as_object()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(qid, value)| value.as_str().map(|text| (qid.clone(), text.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Per-ticket persistence of framework answers, notes and criterion buffers.
///
/// Read and parse failures are logged and treated as "nothing stored".
pub struct IntakeStorage<S> {
    store: Arc<S>,
}

impl<S> Clone for IntakeStorage<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> IntakeStorage<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn read_json(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%key, error = %err, "storage read failed, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%key, error = %err, "stored record is not valid JSON, ignoring");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(value)
            .map_err(|err| StorageError::Unavailable(format!("unable to encode '{key}': {err}")))?;
        self.store.set(key, encoded)
    }

    pub fn load_framework_answers(&self, ticket: &str) -> AnswerSet {
        self.read_json(&storage_key(NS_FRAMEWORK, ticket))
            .map(|value| lenient_answers(&value))
            .unwrap_or_default()
    }

    pub fn save_framework_answers(&self, ticket: &str, answers: &AnswerSet) -> Result<(), StorageError> {
        self.write_json(&storage_key(NS_FRAMEWORK, ticket), answers)
    }

    pub fn load_notes(&self, ticket: &str) -> Option<String> {
        self.read_json(&storage_key(NS_NOTES, ticket))
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn save_notes(&self, ticket: &str, notes: &str) -> Result<(), StorageError> {
        self.write_json(&storage_key(NS_NOTES, ticket), &notes)
    }

    fn load_criteria(&self, ticket: &str) -> BTreeMap<String, CriterionBuffers> {
        let Some(Value::Object(entries)) = self.read_json(&storage_key(NS_CRITERIA, ticket)) else {
            return BTreeMap::new();
        };
        entries
            .into_iter()
            .map(|(criterion_id, buffers)| {
                let stored = CriterionBuffers {
                    answers: buffers.get("a").map(lenient_answers).unwrap_or_default(),
                    justifications: buffers
                        .get("j")
                        .map(lenient_justifications)
                        .unwrap_or_default(),
                };
                (criterion_id, stored)
            })
            .collect()
    }

    pub fn load_criterion_buffers(&self, ticket: &str, criterion_id: &str) -> CriterionBuffers {
        self.load_criteria(ticket)
            .remove(criterion_id)
            .unwrap_or_default()
    }

    pub fn save_criterion_buffers(
        &self,
        ticket: &str,
        criterion_id: &str,
        buffers: &CriterionBuffers,
    ) -> Result<(), StorageError> {
        let mut all = self.load_criteria(ticket);
        all.insert(criterion_id.to_string(), buffers.clone());
        self.write_json(&storage_key(NS_CRITERIA, ticket), &all)
    }

    pub fn clear(&self, ticket: &str) -> Result<(), StorageError> {
        for namespace in [NS_FRAMEWORK, NS_NOTES, NS_CRITERIA] {
            self.store.remove(&storage_key(namespace, ticket))?;
        }
        Ok(())
    }

    /// Actions that reconcile stored records with the in-memory state without
    /// overwriting anything already present.
    pub fn hydration_actions(&self, state: &WizardState) -> Vec<WizardAction> {
        let ticket = state.ticket_key.as_str();
        if ticket.is_empty() {
            return Vec::new();
        }

        let mut actions = Vec::new();

        let stored = self.load_framework_answers(ticket);
        if !stored.is_empty() {
            actions.push(WizardAction::ReplaceFrameworkAnswers {
                answers: merge_missing(&state.framework_answers, stored),
            });
        }

        if state.notes.trim().is_empty() {
            if let Some(notes) = self.load_notes(ticket).filter(|notes| !notes.is_empty()) {
                actions.push(WizardAction::SetNotes { notes });
            }
        }

        if let Some(criterion_id) = &state.selected_criterion_id {
            let stored = self.load_criterion_buffers(ticket, criterion_id);
            actions.push(WizardAction::ReplaceCriterionBuffers {
                answers: merge_missing(&state.criterion_answers, stored.answers),
                justifications: merge_missing(&state.criterion_justifications, stored.justifications),
            });
        }

        actions
    }

    /// Write every record for the state's ticket. Failures are logged, never raised.
    pub fn persist(&self, state: &WizardState) {
        let ticket = state.ticket_key.as_str();
        if ticket.is_empty() {
            return;
        }

        if let Err(err) = self.save_framework_answers(ticket, &state.framework_answers) {
            warn!(%ticket, error = %err, "unable to persist framework answers");
        }
        if let Err(err) = self.save_notes(ticket, &state.notes) {
            warn!(%ticket, error = %err, "unable to persist notes");
        }
        if let Some(criterion_id) = &state.selected_criterion_id {
            let buffers = CriterionBuffers {
                answers: state.criterion_answers.clone(),
                justifications: state.criterion_justifications.clone(),
            };
            if let Err(err) = self.save_criterion_buffers(ticket, criterion_id, &buffers) {
                warn!(%ticket, criterion = %criterion_id, error = %err, "unable to persist criterion buffers");
            }
        }
    }
}
