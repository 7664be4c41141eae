//! Builds registry entries from raw process information.

use crate::behavior::BehaviorStore;
use crate::entry::{Entry, EntryKind};
use crate::process::ProcessInfo;
use std::path::Path;
use tracing::trace;

/// Turns process tables into entry sets. Pure: only reads its inputs.
pub struct RegistrySnapshotBuilder;

impl RegistrySnapshotBuilder {
    /// Resolve one process into an entry.
    ///
    /// Returns `None` when identifier, bundle location or icon is missing, or
    /// when the process is a background process and `show_all` is off.
    pub fn resolve(
        info: &ProcessInfo,
        show_all: bool,
        store: &dyn BehaviorStore,
    ) -> Option<Entry> {
        let (Some(id), Some(url), Some(icon)) = (&info.identifier, &info.bundle_url, &info.icon)
        else {
            trace!(pid = info.pid, "Skipping process with incomplete metadata");
            return None;
        };

        let is_app = info.activation_policy.is_regular();
        if !show_all && !is_app {
            return None;
        }

        Some(Entry {
            id: id.clone(),
            pid: Some(info.pid),
            display_name: display_name(info.localized_name.as_deref(), url),
            icon: icon.clone(),
            source_url: url.clone(),
            behavior: store.behavior_for(id),
            kind: EntryKind::RunningApp,
            is_app,
        })
    }

    /// Build the full entry set for a process table, in no particular order
    pub fn build(
        processes: &[ProcessInfo],
        show_all: bool,
        store: &dyn BehaviorStore,
    ) -> Vec<Entry> {
        processes
            .iter()
            .filter_map(|info| Self::resolve(info, show_all, store))
            .collect()
    }
}

/// Declared name when there is one, otherwise the bundle's file name without extension
fn display_name(localized: Option<&str>, url: &Path) -> String {
    if let Some(name) = localized.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    url.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string_lossy().into_owned())
}

/// Case-insensitive ascending order by display name, ties broken by pid
pub fn sort_by_display_name(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then(a.pid.cmp(&b.pid))
    });
}
