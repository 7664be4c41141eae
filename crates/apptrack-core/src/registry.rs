use crate::behavior::{Behavior, BehaviorStore};
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::notifier::{BehaviorChange, OriginTag};
use crate::process::{ProcessEvent, ProcessId, ProcessInfo, ProcessSource};
use crate::snapshot::RegistrySnapshotBuilder;
use std::sync::Arc;
use tracing::{debug, info};

/// Every input the registry reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Launched(ProcessInfo),
    Terminated { pid: ProcessId },
    BehaviorChanged(BehaviorChange),
}

impl From<ProcessEvent> for RegistryEvent {
    fn from(event: ProcessEvent) -> Self {
        match event {
            ProcessEvent::Launched(info) => RegistryEvent::Launched(info),
            ProcessEvent::Terminated { pid } => RegistryEvent::Terminated { pid },
        }
    }
}

impl From<BehaviorChange> for RegistryEvent {
    fn from(change: BehaviorChange) -> Self {
        RegistryEvent::BehaviorChanged(change)
    }
}

/// The set of running applications and the behavior assigned to each.
///
/// Owns its entries exclusively; readers get clones through [`LiveRegistry::snapshot`].
pub struct LiveRegistry {
    entries: Vec<Entry>,
    show_all: bool,
    origin: OriginTag,
    store: Arc<dyn BehaviorStore>,
}

impl LiveRegistry {
    /// Create an empty registry. Call [`LiveRegistry::reload`] to populate it.
    pub fn new(store: Arc<dyn BehaviorStore>, origin: OriginTag) -> Self {
        let show_all = store.show_all_processes();
        Self {
            entries: Vec::new(),
            show_all,
            origin,
            store,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn snapshot(&self) -> Arc<[Entry]> {
        Arc::from(self.entries.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn show_all(&self) -> bool {
        self.show_all
    }

    pub fn origin(&self) -> &OriginTag {
        &self.origin
    }

    pub fn contains_pid(&self, pid: ProcessId) -> bool {
        self.entries.iter().any(|entry| entry.pid == Some(pid))
    }

    /// Replace every entry with a fresh build from the current process table
    pub fn reload(&mut self, source: &dyn ProcessSource) {
        let processes = source.current_processes();
        self.entries =
            RegistrySnapshotBuilder::build(&processes, self.show_all, self.store.as_ref());
        info!(
            processes = processes.len(),
            entries = self.entries.len(),
            show_all = self.show_all,
            "Registry reloaded"
        );
    }

    /// Persist the visibility flag, then adopt it and rebuild the whole set.
    ///
    /// Nothing changes when the store rejects the write. Per-entry state beyond identity does not survive the rebuild.
    pub fn set_show_all(
        &mut self,
        show_all: bool,
        source: &dyn ProcessSource,
    ) -> Result<(), RegistryError> {
        self.store.set_show_all_processes(show_all)?;
        self.show_all = show_all;
        self.reload(source);
        Ok(())
    }

    /// Track a newly launched process. Returns true when an entry was added.
    pub fn on_launched(&mut self, info: &ProcessInfo) -> bool {
        if self.contains_pid(info.pid) {
            debug!(pid = info.pid, "Ignoring duplicate launch");
            return false;
        }

        match RegistrySnapshotBuilder::resolve(info, self.show_all, self.store.as_ref()) {
            Some(entry) => {
                debug!(pid = info.pid, app_id = %entry.id, "Tracking launched application");
                self.entries.push(entry);
                true
            }
            None => false,
        }
    }

    /// Forget a terminated process. Returns the removed entry, if it was tracked.
    pub fn on_terminated(&mut self, pid: ProcessId) -> Option<Entry> {
        let index = self.entries.iter().position(|entry| entry.pid == Some(pid))?;
        let entry = self.entries.remove(index);
        debug!(pid, app_id = %entry.id, "Stopped tracking terminated application");
        Some(entry)
    }

    /// Apply a behavior change announced elsewhere. Returns true when an entry changed.
    pub fn on_behavior_changed(&mut self, change: &BehaviorChange) -> bool {
        if change.origin == self.origin {
            debug!(app_id = %change.app_id, "Ignoring self-originated behavior change");
            return false;
        }

        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == change.app_id) else {
            return false;
        };

        entry.behavior = change.behavior;
        debug!(
            app_id = %change.app_id,
            behavior = ?change.behavior,
            origin = %change.origin,
            "Applied behavior change"
        );
        true
    }

    /// Assign a behavior on behalf of this registry's own user interface.
    ///
    /// Writes the store under this registry's origin, so the resulting
    /// notification is suppressed, and updates every instance of the app here.
    pub fn assign_behavior(
        &mut self,
        app_id: &str,
        behavior: Behavior,
    ) -> Result<bool, RegistryError> {
        self.store.set_behavior(app_id, behavior, &self.origin)?;

        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|entry| entry.id == app_id) {
            changed |= entry.behavior != behavior;
            entry.behavior = behavior;
        }
        Ok(changed)
    }

    /// Dispatch a typed event. Returns true when the entry set changed.
    pub fn apply(&mut self, event: &RegistryEvent) -> bool {
        match event {
            RegistryEvent::Launched(info) => self.on_launched(info),
            RegistryEvent::Terminated { pid } => self.on_terminated(*pid).is_some(),
            RegistryEvent::BehaviorChanged(change) => self.on_behavior_changed(change),
        }
    }
}
