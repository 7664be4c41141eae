use apptrack_core::RegistryConfig;

/// Platform-independent factory that selects the appropriate process source at compile time
pub struct PlatformProcessSourceFactory;

#[cfg(unix)]
pub type PlatformProcessSource = apptrack_unix::UnixProcessSource;

#[cfg(windows)]
pub type PlatformProcessSource = apptrack_windows::WindowsProcessSource;

impl PlatformProcessSourceFactory {
    pub fn create(config: &RegistryConfig) -> PlatformProcessSource {
        #[cfg(unix)]
        return apptrack_unix::UnixProcessSourceFactory::create_process_source(config);

        #[cfg(windows)]
        return apptrack_windows::WindowsProcessSourceFactory::create_process_source(config);
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return apptrack_unix::UnixProcessSourceFactory::platform_name();

        #[cfg(windows)]
        return apptrack_windows::WindowsProcessSourceFactory::platform_name();
    }
}
