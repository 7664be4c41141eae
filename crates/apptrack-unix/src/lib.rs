//! Unix process source: polls the process table with sysinfo and resolves
//! application identity from `.app` bundles and XDG desktop entries.

pub mod app_bundle;
pub mod desktop_entry;
#[cfg(unix)]
mod unix_process_source;

#[cfg(unix)]
pub use unix_process_source::UnixProcessSource;

#[cfg(unix)]
pub struct UnixProcessSourceFactory;

#[cfg(unix)]
impl UnixProcessSourceFactory {
    pub fn create_process_source(config: &apptrack_core::RegistryConfig) -> UnixProcessSource {
        UnixProcessSource::new(config)
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
