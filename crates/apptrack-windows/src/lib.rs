//! Windows-specific process source implementation

mod windows_process_source;

pub use windows_process_source::WindowsProcessSource;

/// Windows-specific process source factory
pub struct WindowsProcessSourceFactory;

impl WindowsProcessSourceFactory {
    pub fn create_process_source(config: &apptrack_core::RegistryConfig) -> WindowsProcessSource {
        WindowsProcessSource::new(config)
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
