use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Unique identifier for a process
pub type ProcessId = u32;

/// How a process presents itself to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Ordinary application with windows the user interacts with
    Regular,
    /// Agent or helper with no regular user interface
    Accessory,
    /// Background process that never presents any interface
    #[default]
    Prohibited,
}

impl ActivationPolicy {
    pub fn is_regular(self) -> bool {
        self == ActivationPolicy::Regular
    }
}

/// Where the icon of an application can be found
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconRef {
    /// Icon stored in a file (icns, png, executable resources)
    File(PathBuf),
    /// Icon looked up by name in the desktop icon theme
    Named(String),
    /// Platform generic application icon
    Generic,
}

/// Information about a running process, as reported by the host
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    /// Stable application identifier (bundle id, desktop file id, executable name)
    pub identifier: Option<String>,
    /// Location of the application bundle or executable
    pub bundle_url: Option<PathBuf>,
    pub icon: Option<IconRef>,
    pub activation_policy: ActivationPolicy,
    /// Name declared by the bundle metadata, already localized when possible
    pub localized_name: Option<String>,
}

impl ProcessInfo {
    pub fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            identifier: None,
            bundle_url: None,
            icon: None,
            activation_policy: ActivationPolicy::default(),
            localized_name: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_bundle_url(mut self, url: impl Into<PathBuf>) -> Self {
        self.bundle_url = Some(url.into());
        self
    }

    pub fn with_icon(mut self, icon: IconRef) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_activation_policy(mut self, policy: ActivationPolicy) -> Self {
        self.activation_policy = policy;
        self
    }

    pub fn with_localized_name(mut self, name: impl Into<String>) -> Self {
        self.localized_name = Some(name.into());
        self
    }
}

/// Launch and terminate notifications produced by a process source
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Launched(ProcessInfo),
    Terminated { pid: ProcessId },
}

/// Snapshot access to the host's process table
pub trait ProcessSource: Send + Sync {
    /// Every process currently running on the host
    fn current_processes(&self) -> Vec<ProcessInfo>;
}

/// A process source that also reports launches and terminations as they happen
#[async_trait]
pub trait ProcessEventSource: ProcessSource {
    /// Wait for the next batch of events.
    ///
    /// Must be cancel safe: the registry service polls it inside `tokio::select!`.
    async fn next_events(&mut self) -> Vec<ProcessEvent>;
}

#[async_trait]
impl ProcessEventSource for Box<dyn ProcessEventSource> {
    async fn next_events(&mut self) -> Vec<ProcessEvent> {
        (**self).next_events().await
    }
}

impl ProcessSource for Box<dyn ProcessEventSource> {
    fn current_processes(&self) -> Vec<ProcessInfo> {
        (**self).current_processes()
    }
}

/// Identity of a process instance; the start time tells a reused pid apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    pub pid: ProcessId,
    pub start_time: u64,
}

/// Result of comparing two consecutive process tables
#[derive(Debug, Default, PartialEq)]
pub struct DiffResult {
    pub launched: Vec<ProcessKey>,
    pub terminated: Vec<ProcessId>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.launched.is_empty() && self.terminated.is_empty()
    }
}

/// Tracks the pid set seen by a polling source and reports what changed.
///
/// The first update only records a baseline.
#[derive(Debug, Default)]
pub struct ProcessDiff {
    known: HashMap<ProcessId, u64>,
    primed: bool,
}

impl ProcessDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn update<I: IntoIterator<Item = ProcessKey>>(&mut self, current: I) -> DiffResult {
        let current: HashMap<ProcessId, u64> = current
            .into_iter()
            .map(|key| (key.pid, key.start_time))
            .collect();

        if !self.primed {
            self.known = current;
            self.primed = true;
            return DiffResult::default();
        }

        let mut result = DiffResult::default();

        for (pid, start_time) in &self.known {
            match current.get(pid) {
                Some(now) if now == start_time => {}
                _ => result.terminated.push(*pid),
            }
        }

        for (pid, start_time) in &current {
            if self.known.get(pid) != Some(start_time) {
                result.launched.push(ProcessKey {
                    pid: *pid,
                    start_time: *start_time,
                });
            }
        }

        result.terminated.sort_unstable();
        result.launched.sort_unstable_by_key(|key| key.pid);
        self.known = current;
        result
    }
}
