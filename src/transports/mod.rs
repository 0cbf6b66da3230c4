//! Built-in transports

#[cfg(feature = "console")]
pub mod console;
#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "console")]
pub use console::ConsoleTransport;
#[cfg(feature = "file")]
pub use file::{FileHandles, FileOptions, FileTransport};
