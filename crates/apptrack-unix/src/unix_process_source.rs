use crate::app_bundle::AppBundle;
use crate::desktop_entry::DesktopEntryIndex;
use apptrack_core::{
    ActivationPolicy, IconRef, ProcessDiff, ProcessEvent, ProcessEventSource, ProcessId,
    ProcessInfo, ProcessKey, ProcessSource, RegistryConfig,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Unix process source that polls the process table and reports changes
pub struct UnixProcessSource {
    system: Mutex<System>,
    desktop_entries: DesktopEntryIndex,
    diff: ProcessDiff,
    poll_interval: Duration,
    interval: Option<Interval>,
    /// Only processes owned by this user are reported
    owner: u32,
}

impl UnixProcessSource {
    pub fn new(config: &RegistryConfig) -> Self {
        info!("Initializing Unix process source with system monitoring");
        let desktop_entries = DesktopEntryIndex::load(&config.desktop_entry_dirs);
        debug!(count = desktop_entries.len(), "Loaded desktop entry index");

        let mut source = Self {
            system: Mutex::new(System::new()),
            desktop_entries,
            diff: ProcessDiff::new(),
            poll_interval: config.poll_interval(),
            interval: None,
            owner: nix::unistd::Uid::current().as_raw(),
        };
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
        // Threads show up as processes on Linux
        if process.thread_kind().is_some() {
            return false;
        }
        process.user_id().is_some_and(|uid| **uid == self.owner)
    }

    fn describe(&self, pid: ProcessId, process: &Process) -> ProcessInfo {
        identify(pid, process.exe(), &self.desktop_entries)
    }

    fn poll(&mut self) -> Vec<ProcessEvent> {
        let keys = self.refresh_keys();
        let result = self.diff.update(keys);
        if result.is_empty() {
            return Vec::new();
        }

        debug!(
            launched = result.launched.len(),
            terminated = result.terminated.len(),
            "Process table changed"
        );

        let mut events: Vec<ProcessEvent> = result
            .terminated
            .into_iter()
            .map(|pid| ProcessEvent::Terminated { pid })
            .collect();

        let system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        for key in result.launched {
            if let Some(process) = system.process(Pid::from_u32(key.pid)) {
                events.push(ProcessEvent::Launched(self.describe(key.pid, process)));
            }
        }
        events
    }
}

#[async_trait]
impl ProcessEventSource for UnixProcessSource {
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

impl ProcessSource for UnixProcessSource {
    fn current_processes(&self) -> Vec<ProcessInfo> {
        let system = self.refresh();
        system
            .processes()
            .iter()
            .filter(|(_, process)| self.is_tracked(process))
            .map(|(pid, process)| self.describe(pid.as_u32(), process))
            .collect()
    }
}

/// Application identity of an executable: enclosing `.app` bundle first, then a
/// desktop entry, then the bare executable. No executable means no location.
fn identify(pid: ProcessId, exe: Option<&Path>, desktop_entries: &DesktopEntryIndex) -> ProcessInfo {
    let info = ProcessInfo::new(pid);
    let Some(exe) = exe else {
        return info;
    };

    if let Some(bundle) = AppBundle::enclosing(exe) {
        let policy = if bundle.nested {
            ActivationPolicy::Accessory
        } else {
            ActivationPolicy::Regular
        };
        let info = info
            .with_identifier(bundle.identifier)
            .with_bundle_url(bundle.path)
            .with_icon(bundle.icon)
            .with_activation_policy(policy);
        return match bundle.name {
            Some(name) => info.with_localized_name(name),
            None => info,
        };
    }

    if let Some(entry) = desktop_entries.lookup(exe) {
        let policy = if entry.no_display {
            ActivationPolicy::Accessory
        } else {
            ActivationPolicy::Regular
        };
        return info
            .with_identifier(entry.id.clone())
            .with_bundle_url(exe)
            .with_icon(entry.icon.clone().unwrap_or(IconRef::Generic))
            .with_activation_policy(policy)
            .with_localized_name(entry.name.clone());
    }

    match executable_name(exe) {
        Some(name) => info
            .with_identifier(name)
            .with_bundle_url(exe)
            .with_icon(IconRef::Generic)
            .with_activation_policy(ActivationPolicy::Prohibited),
        None => info,
    }
}

fn executable_name(exe: &Path) -> Option<String> {
    exe.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn desktop_index(dir: &Path) -> DesktopEntryIndex {
        fs::write(
            dir.join("org.example.Player.desktop"),
            "[Desktop Entry]\nType=Application\nName=Player\nExec=player %U\nIcon=org.example.Player\n",
        )
        .unwrap();
        fs::write(
            dir.join("sync-agent.desktop"),
            "[Desktop Entry]\nType=Application\nName=Sync Agent\nExec=sync-agent --daemon\nNoDisplay=true\n",
        )
        .unwrap();
        let mut index = DesktopEntryIndex::default();
        index.scan_dir(dir, &[]).unwrap();
        index
    }

    fn bundle_exe(root: &Path, relative: &str) -> PathBuf {
        let macos = root.join(relative).join("Contents").join("MacOS");
        fs::create_dir_all(&macos).unwrap();
        let exe = macos.join("player");
        fs::write(&exe, b"").unwrap();
        exe
    }

    #[test]
    fn test_bundle_takes_precedence_over_desktop_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index = desktop_index(dir.path());
        // Executable named like a desktop entry's program, but inside a bundle
        let exe = bundle_exe(dir.path(), "Player.app");

        let info = identify(7, Some(&exe), &index);
        assert_eq!(info.identifier.as_deref(), Some("Player"));
        assert_eq!(info.bundle_url, Some(dir.path().join("Player.app")));
        assert_eq!(info.icon, Some(IconRef::Generic));
        assert_eq!(info.activation_policy, ActivationPolicy::Regular);
    }

    #[test]
    fn test_nested_bundle_is_accessory() {
        let dir = tempfile::tempdir().unwrap();
        let exe = bundle_exe(dir.path(), "Host.app/Contents/Frameworks/Helper.app");

        let info = identify(7, Some(&exe), &DesktopEntryIndex::default());
        assert_eq!(info.identifier.as_deref(), Some("Helper"));
        assert_eq!(info.activation_policy, ActivationPolicy::Accessory);
    }

    #[test]
    fn test_desktop_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = desktop_index(dir.path());

        let player = identify(1, Some(Path::new("/usr/bin/player")), &index);
        assert_eq!(player.identifier.as_deref(), Some("org.example.Player"));
        assert_eq!(player.localized_name.as_deref(), Some("Player"));
        assert_eq!(player.bundle_url, Some(PathBuf::from("/usr/bin/player")));
        assert_eq!(
            player.icon,
            Some(IconRef::Named("org.example.Player".to_string()))
        );
        assert_eq!(player.activation_policy, ActivationPolicy::Regular);

        let agent = identify(2, Some(Path::new("/usr/libexec/sync-agent")), &index);
        assert_eq!(agent.identifier.as_deref(), Some("sync-agent"));
        assert_eq!(agent.icon, Some(IconRef::Generic));
        assert_eq!(agent.activation_policy, ActivationPolicy::Accessory);
    }

    #[test]
    fn test_bare_executable_and_missing_exe() {
        let index = DesktopEntryIndex::default();

        let daemon = identify(3, Some(Path::new("/usr/sbin/indexd")), &index);
        assert_eq!(daemon.identifier.as_deref(), Some("indexd"));
        assert_eq!(daemon.bundle_url, Some(PathBuf::from("/usr/sbin/indexd")));
        assert_eq!(daemon.activation_policy, ActivationPolicy::Prohibited);

        let unknown = identify(4, None, &index);
        assert_eq!(unknown, ProcessInfo::new(4));
    }
}
