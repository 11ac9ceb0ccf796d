pub mod host;
pub mod launcher;
pub mod source;

// Re-exports for convenience
pub use host::{DomainSpec, HostError, HostSpec, InMemoryHost};
pub use launcher::{LaunchError, ProcessLauncher};
pub use source::ChannelEventSource;
