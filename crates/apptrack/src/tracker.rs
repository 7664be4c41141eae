use crate::factory::PlatformProcessSourceFactory;
use apptrack_core::{
    Behavior, BehaviorStore, ChangeNotifier, Entry, ProcessEventSource, RegistryConfig,
    RegistryError, RegistryHandle, RegistryService, RegistrySnapshot, sort_by_display_name,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// High-level platform-independent tracker of running applications
pub struct AppTracker {
    handle: RegistryHandle,
}

impl AppTracker {
    /// Start tracking with the process source of the current platform.
    ///
    /// The configuration is validated when the service is spawned.
    pub fn start(
        config: RegistryConfig,
        store: Arc<dyn BehaviorStore>,
        notifier: ChangeNotifier,
    ) -> Result<Self, RegistryError> {
        info!(
            platform = PlatformProcessSourceFactory::platform_name(),
            "Starting application tracker"
        );
        let source = PlatformProcessSourceFactory::create(&config);
        Self::with_source(config, store, notifier, source)
    }

    /// Start tracking over a caller-supplied process source
    pub fn with_source<S: ProcessEventSource + 'static>(
        config: RegistryConfig,
        store: Arc<dyn BehaviorStore>,
        notifier: ChangeNotifier,
        source: S,
    ) -> Result<Self, RegistryError> {
        let handle = RegistryService::spawn(&config, store, &notifier, source)?;
        Ok(Self { handle })
    }

    pub fn platform_name() -> &'static str {
        PlatformProcessSourceFactory::platform_name()
    }

    /// Latest published entries in registry order
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.handle.snapshot()
    }

    /// Latest published entries ordered by display name
    pub fn sorted_entries(&self) -> Vec<Entry> {
        let mut entries = self.handle.snapshot().to_vec();
        sort_by_display_name(&mut entries);
        entries
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<RegistrySnapshot> {
        self.handle.watch_snapshots()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Show or hide background processes
    pub async fn set_show_all(&self, show_all: bool) -> Result<(), RegistryError> {
        self.handle.set_show_all(show_all).await
    }

    pub async fn reload(&self) -> Result<(), RegistryError> {
        self.handle.reload().await
    }

    /// Assign a behavior to every running instance of an application
    pub async fn assign_behavior(
        &self,
        app_id: impl Into<String>,
        behavior: Behavior,
    ) -> Result<(), RegistryError> {
        self.handle.assign_behavior(app_id, behavior).await
    }

    /// Stop tracking and release the change subscription
    pub async fn shutdown(mut self) -> Result<(), RegistryError> {
        self.handle.shutdown().await
    }
}
