use crate::error::RegistryError;
use crate::notifier::{BehaviorChange, ChangeNotifier, OriginTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Policy value a user assigns to an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// No explicit rule; the global default applies
    #[default]
    Inferred,
    /// Top-row keys act as media keys
    Media,
    /// Top-row keys act as function keys
    Function,
}

/// Mapping from application identifier to the behavior the user chose for it
pub trait BehaviorStore: Send + Sync {
    /// Behavior for `app_id`, [`Behavior::Inferred`] when nothing was set
    fn behavior_for(&self, app_id: &str) -> Behavior;

    /// Record a behavior and announce it with `origin` as the source
    fn set_behavior(
        &self,
        app_id: &str,
        behavior: Behavior,
        origin: &OriginTag,
    ) -> Result<(), RegistryError>;

    /// Whether background processes are listed alongside regular applications
    fn show_all_processes(&self) -> bool;

    fn set_show_all_processes(&self, show_all: bool) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    #[serde(default)]
    show_all_processes: bool,
    #[serde(default)]
    rules: BTreeMap<String, Behavior>,
}

impl StoreState {
    /// Returns true when the stored value actually changed
    fn apply_rule(&mut self, app_id: &str, behavior: Behavior) -> bool {
        let previous = match behavior {
            Behavior::Inferred => self.rules.remove(app_id),
            other => self.rules.insert(app_id.to_string(), other),
        };
        previous.unwrap_or_default() != behavior
    }
}

/// In-memory behavior store that announces changes on a [`ChangeNotifier`]
#[derive(Debug, Default)]
pub struct MemoryBehaviorStore {
    state: RwLock<StoreState>,
    notifier: Option<ChangeNotifier>,
}

impl MemoryBehaviorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(notifier: ChangeNotifier) -> Self {
        Self {
            state: RwLock::default(),
            notifier: Some(notifier),
        }
    }

    /// Seed a rule without announcing it
    pub fn insert(&self, app_id: impl Into<String>, behavior: Behavior) {
        let app_id = app_id.into();
        self.write_state().apply_rule(&app_id, behavior);
    }

    pub fn rules(&self) -> BTreeMap<String, Behavior> {
        self.read_state().rules.clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, app_id: &str, behavior: Behavior, origin: &OriginTag) {
        if let Some(notifier) = &self.notifier {
            notifier.publish(BehaviorChange::new(app_id, behavior, origin.clone()));
        }
    }
}

impl BehaviorStore for MemoryBehaviorStore {
    fn behavior_for(&self, app_id: &str) -> Behavior {
        self.read_state()
            .rules
            .get(app_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_behavior(
        &self,
        app_id: &str,
        behavior: Behavior,
        origin: &OriginTag,
    ) -> Result<(), RegistryError> {
        let changed = self.write_state().apply_rule(app_id, behavior);
        if changed {
            debug!(app_id = %app_id, ?behavior, origin = %origin, "Behavior updated");
            self.announce(app_id, behavior, origin);
        }
        Ok(())
    }

    fn show_all_processes(&self) -> bool {
        self.read_state().show_all_processes
    }

    fn set_show_all_processes(&self, show_all: bool) -> Result<(), RegistryError> {
        self.write_state().show_all_processes = show_all;
        Ok(())
    }
}

/// Behavior store persisted as a JSON document
#[derive(Debug)]
pub struct JsonBehaviorStore {
    path: PathBuf,
    memory: MemoryBehaviorStore,
}

impl JsonBehaviorStore {
    /// Open the store at `path`, starting empty when the file does not exist yet
    pub fn open(
        path: impl Into<PathBuf>,
        notifier: Option<ChangeNotifier>,
    ) -> Result<Self, RegistryError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let state: StoreState = serde_json::from_str(&raw)?;
            info!(path = %path.display(), rules = state.rules.len(), "Loaded behavior rules");
            state
        } else {
            info!(path = %path.display(), "No behavior file yet, starting empty");
            StoreState::default()
        };

        Ok(Self {
            path,
            memory: MemoryBehaviorStore {
                state: RwLock::new(state),
                notifier,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rules(&self) -> BTreeMap<String, Behavior> {
        self.memory.rules()
    }

    /// Apply `change` to a copy of the state, save the copy and only then make it current.
    ///
    /// The write lock is held throughout, so saves land on disk in mutation order.
    fn update(&self, change: impl FnOnce(&mut StoreState) -> bool) -> Result<bool, RegistryError> {
        let mut state = self.memory.write_state();
        let mut next = state.clone();
        if !change(&mut next) {
            return Ok(false);
        }
        self.save(&next)?;
        *state = next;
        Ok(true)
    }

    fn save(&self, state: &StoreState) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(state)?;
        self.write_file(json.as_bytes()).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to save behavior rules");
            RegistryError::Store(format!("failed to save {}: {e}", self.path.display()))
        })
    }

    fn write_file(&self, contents: &[u8]) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl BehaviorStore for JsonBehaviorStore {
    fn behavior_for(&self, app_id: &str) -> Behavior {
        self.memory.behavior_for(app_id)
    }

    fn set_behavior(
        &self,
        app_id: &str,
        behavior: Behavior,
        origin: &OriginTag,
    ) -> Result<(), RegistryError> {
        if self.update(|state| state.apply_rule(app_id, behavior))? {
            debug!(app_id = %app_id, ?behavior, origin = %origin, "Behavior saved");
            self.memory.announce(app_id, behavior, origin);
        }
        Ok(())
    }

    fn show_all_processes(&self) -> bool {
        self.memory.show_all_processes()
    }

    fn set_show_all_processes(&self, show_all: bool) -> Result<(), RegistryError> {
        self.update(|state| {
            let changed = state.show_all_processes != show_all;
            state.show_all_processes = show_all;
            changed
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Delivery;

    #[test]
    fn test_default_behavior_is_inferred() {
        let store = MemoryBehaviorStore::new();
        assert_eq!(store.behavior_for("com.example.unknown"), Behavior::Inferred);
        assert!(!store.show_all_processes());
    }

    #[tokio::test]
    async fn test_set_behavior_announces_only_real_changes() {
        let notifier = ChangeNotifier::new(8);
        let mut sub = notifier.subscribe();
        let store = MemoryBehaviorStore::with_notifier(notifier.clone());
        let origin = OriginTag::new("rules-window");

        store.set_behavior("com.example.editor", Behavior::Function, &origin).unwrap();
        store.set_behavior("com.example.editor", Behavior::Function, &origin).unwrap();
        store.set_behavior("com.example.editor", Behavior::Inferred, &origin).unwrap();

        assert_eq!(
            sub.recv().await,
            Delivery::Change(BehaviorChange::new(
                "com.example.editor",
                Behavior::Function,
                origin.clone()
            ))
        );
        assert_eq!(
            sub.recv().await,
            Delivery::Change(BehaviorChange::new(
                "com.example.editor",
                Behavior::Inferred,
                origin
            ))
        );
        assert!(store.rules().is_empty());
    }

    #[test]
    fn test_insert_is_silent() {
        let notifier = ChangeNotifier::new(8);
        let store = MemoryBehaviorStore::with_notifier(notifier);
        store.insert("com.example.player", Behavior::Media);
        assert_eq!(store.behavior_for("com.example.player"), Behavior::Media);
    }

    #[test]
    fn test_json_store_persists_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("behaviors.json");
        let origin = OriginTag::new("test");

        {
            let store = JsonBehaviorStore::open(&path, None).unwrap();
            assert!(store.rules().is_empty());
            store.set_behavior("com.example.editor", Behavior::Function, &origin).unwrap();
            store.set_show_all_processes(true).unwrap();
        }

        let store = JsonBehaviorStore::open(&path, None).unwrap();
        assert_eq!(store.behavior_for("com.example.editor"), Behavior::Function);
        assert!(store.show_all_processes());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"showAllProcesses\": true"));
        assert!(raw.contains("\"com.example.editor\": \"function\""));
    }

    /// A store whose parent directory is a regular file, so every save fails
    fn unwritable_store(dir: &Path, notifier: Option<ChangeNotifier>) -> JsonBehaviorStore {
        let blocker = dir.join("blocker");
        fs::write(&blocker, b"").unwrap();
        JsonBehaviorStore::open(blocker.join("behaviors.json"), notifier).unwrap()
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = ChangeNotifier::new(8);
        let mut sub = notifier.subscribe();
        let store = unwritable_store(dir.path(), Some(notifier));
        let origin = OriginTag::new("rules-window");

        let result = store.set_behavior("com.example.editor", Behavior::Media, &origin);
        assert!(matches!(result, Err(RegistryError::Store(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(store.behavior_for("com.example.editor"), Behavior::Inferred);

        assert!(store.set_show_all_processes(true).is_err());
        assert!(!store.show_all_processes());

        // Nothing was announced
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await;
        assert!(next.is_err());
    }

    #[test]
    fn test_concurrent_saves_keep_every_rule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behaviors.json");
        let store = std::sync::Arc::new(JsonBehaviorStore::open(&path, None).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let origin = OriginTag::new("worker");
                    for j in 0..10 {
                        store
                            .set_behavior(&format!("app{i}.{j}"), Behavior::Function, &origin)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = JsonBehaviorStore::open(&path, None).unwrap();
        assert_eq!(reopened.rules().len(), 80);
        assert_eq!(reopened.rules(), store.rules());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behaviors.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonBehaviorStore::open(&path, None),
            Err(RegistryError::Serialization(_))
        ));
    }
}
