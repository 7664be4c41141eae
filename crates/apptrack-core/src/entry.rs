use crate::behavior::Behavior;
use crate::process::{IconRef, ProcessId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What an entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum EntryKind {
    /// A currently running application instance
    RunningApp,
    /// A saved rule for an application that may not be running
    Rule,
}

/// One tracked application instance with its resolved metadata and behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub pid: Option<ProcessId>,
    pub display_name: String,
    pub icon: IconRef,
    pub source_url: PathBuf,
    pub behavior: Behavior,
    pub kind: EntryKind,
    pub is_app: bool,
}

impl Entry {
    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }
}
