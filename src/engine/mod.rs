// Sat Jan 18 2026 - Alex

pub mod core;
pub mod loader;

#[cfg(target_os = "macos")]
pub mod dyld;
#[cfg(target_os = "macos")]
pub mod global;

pub use self::core::{Interposer, InterposerState, ReportObserver};
pub use loader::{ImageLoader, LoadCallback, ManualLoader};

#[cfg(target_os = "macos")]
pub use dyld::DyldLoader;
#[cfg(target_os = "macos")]
pub use global::{interposer, submit_global};
