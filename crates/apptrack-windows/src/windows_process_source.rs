use apptrack_core::{
    ActivationPolicy, IconRef, ProcessDiff, ProcessEvent, ProcessEventSource, ProcessId,
    ProcessInfo, ProcessKey, ProcessSource, RegistryConfig,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, Uid, UpdateKind};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Windows process source that polls the process table and reports changes
pub struct WindowsProcessSource {
    system: Mutex<System>,
    diff: ProcessDiff,
    poll_interval: Duration,
    interval: Option<Interval>,
    /// Only processes owned by this user are reported; unknown means no filter
    owner: Option<Uid>,
    /// Launched without a visible window yet; re-checked on every poll
    windowless: HashSet<ProcessId>,
}

impl WindowsProcessSource {
    pub fn new(config: &RegistryConfig) -> Self {
        info!("Initializing Windows process source with system monitoring");
        let mut source = Self {
            system: Mutex::new(System::new()),
            diff: ProcessDiff::new(),
            poll_interval: config.poll_interval(),
            interval: None,
            owner: None,
            windowless: HashSet::new(),
        };

        let owner = {
            let system = source.refresh();
            sysinfo::get_current_pid()
                .ok()
                .and_then(|pid| system.process(pid))
                .and_then(|process| process.user_id().cloned())
        };
        source.owner = owner;
        if source.owner.is_none() {
            warn!("Could not determine current user, reporting processes of every user");
        }

        // Baseline now, so launches between construction and the first poll are reported
        let keys = source.refresh_keys();
        source.diff.update(keys);
        source
    }

    fn refresh(&self) -> std::sync::MutexGuard<'_, System> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        system
    }

    fn refresh_keys(&self) -> Vec<ProcessKey> {
        let system = self.refresh();
        system
            .processes()
            .iter()
            .filter(|(_, process)| self.is_tracked(process))
            .map(|(pid, process)| ProcessKey {
                pid: pid.as_u32(),
                start_time: process.start_time(),
            })
            .collect()
    }

    fn is_tracked(&self, process: &Process) -> bool {
        match &self.owner {
            Some(owner) => process.user_id() == Some(owner),
            None => true,
        }
    }

    fn poll(&mut self) -> Vec<ProcessEvent> {
        let keys = self.refresh_keys();
        let result = self.diff.update(keys);
        for pid in &result.terminated {
            self.windowless.remove(pid);
        }
        if result.is_empty() && self.windowless.is_empty() {
            return Vec::new();
        }

        let windowed = windowed_processes();
        let promoted = promote_windowed(&mut self.windowless, &windowed);
        if result.is_empty() && promoted.is_empty() {
            return Vec::new();
        }

        debug!(
            launched = result.launched.len(),
            terminated = result.terminated.len(),
            promoted = promoted.len(),
            "Process table changed"
        );

        let mut events: Vec<ProcessEvent> = result
            .terminated
            .into_iter()
            .map(|pid| ProcessEvent::Terminated { pid })
            .collect();

        let system = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        // A window showed up after launch: report the process again as a regular app
        for pid in promoted {
            if let Some(process) = system.process(Pid::from_u32(pid)) {
                events.push(ProcessEvent::Terminated { pid });
                events.push(ProcessEvent::Launched(describe(pid, process, &windowed)));
            }
        }

        for key in result.launched {
            if let Some(process) = system.process(Pid::from_u32(key.pid)) {
                let info = describe(key.pid, process, &windowed);
                if info.identifier.is_some() && !info.activation_policy.is_regular() {
                    self.windowless.insert(key.pid);
                }
                events.push(ProcessEvent::Launched(info));
            }
        }
        events
    }
}

#[async_trait]
impl ProcessEventSource for WindowsProcessSource {
    async fn next_events(&mut self) -> Vec<ProcessEvent> {
        loop {
            let poll_interval = self.poll_interval;
            let interval = self.interval.get_or_insert_with(|| {
                let mut interval = tokio::time::interval(poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
            interval.tick().await;

            let events = self.poll();
            if !events.is_empty() {
                return events;
            }
        }
    }
}

impl ProcessSource for WindowsProcessSource {
    fn current_processes(&self) -> Vec<ProcessInfo> {
        let windowed = windowed_processes();
        let system = self.refresh();
        system
            .processes()
            .iter()
            .filter(|(_, process)| self.is_tracked(process))
            .map(|(pid, process)| describe(pid.as_u32(), process, &windowed))
            .collect()
    }
}

/// Applications usually show their first window a moment after launch,
/// so a windowless verdict is provisional; see [`promote_windowed`].
fn describe(
    pid: ProcessId,
    process: &Process,
    windowed: &HashSet<ProcessId>,
) -> ProcessInfo {
    let info = ProcessInfo::new(pid);
    let Some(exe) = process.exe() else {
        return info;
    };
    let Some(stem) = exe.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return info;
    };

    let policy = if windowed.contains(&pid) {
        ActivationPolicy::Regular
    } else {
        ActivationPolicy::Prohibited
    };

    // The executable carries its own icon resources
    info.with_identifier(stem)
        .with_bundle_url(exe)
        .with_icon(IconRef::File(exe.to_path_buf()))
        .with_activation_policy(policy)
}

/// Remove and return, in pid order, the pending pids that now own a visible window
fn promote_windowed(
    windowless: &mut HashSet<ProcessId>,
    windowed: &HashSet<ProcessId>,
) -> Vec<ProcessId> {
    let mut promoted: Vec<ProcessId> = windowless.intersection(windowed).copied().collect();
    promoted.sort_unstable();
    for pid in &promoted {
        windowless.remove(pid);
    }
    promoted
}

/// Processes owning a visible top-level window; these count as regular applications
#[cfg(windows)]
fn windowed_processes() -> HashSet<ProcessId> {
    use windows::Win32::UI::WindowsAndMessaging::{
        FindWindowExW, GetWindowThreadProcessId, IsWindowVisible,
    };
    use windows::core::PCWSTR;

    let mut owners = HashSet::new();
    let mut previous = None;

    loop {
        // SAFETY: null class and title walk every top-level window in z-order
        let next = unsafe { FindWindowExW(None, previous, PCWSTR::null(), PCWSTR::null()) };
        let Ok(hwnd) = next else {
            break;
        };
        if hwnd.is_invalid() {
            break;
        }

        // SAFETY: hwnd was just returned by FindWindowExW; pid outlives the call
        unsafe {
            if IsWindowVisible(hwnd).as_bool() {
                let mut pid = 0u32;
                GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32));
                if pid != 0 {
                    owners.insert(pid);
                }
            }
        }
        previous = Some(hwnd);
    }

    debug!(count = owners.len(), "Enumerated windowed processes");
    owners
}

#[cfg(not(windows))]
fn windowed_processes() -> HashSet<ProcessId> {
    HashSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_windowed() {
        let mut windowless = HashSet::from([10, 20, 30]);
        let windowed = HashSet::from([30, 10, 99]);

        assert_eq!(promote_windowed(&mut windowless, &windowed), vec![10, 30]);
        assert_eq!(windowless, HashSet::from([20]));

        // Already promoted pids are not reported twice
        assert!(promote_windowed(&mut windowless, &windowed).is_empty());
    }

    #[test]
    fn test_nothing_pending() {
        let mut windowless = HashSet::new();
        let windowed = HashSet::from([1, 2]);
        assert!(promote_windowed(&mut windowless, &windowed).is_empty());
    }
}
