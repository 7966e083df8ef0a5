//! Governor daemon support: config resolution and the file-backed signal
//! source the binary feeds the governor from.

pub mod config;
pub mod file_signals;

pub use config::DaemonConfig;
pub use file_signals::FileSignalSource;
