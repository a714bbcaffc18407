// Tue Jan 15 2026 - Alex

//! Rebinds the imported-function pointers of loaded Mach-O images so calls
//! go to caller-supplied replacements, for every image mapped now or later.

pub mod config;
pub mod engine;
pub mod image;
pub mod memory;
pub mod rebind;
pub mod ui;
pub mod utils;

pub use config::EngineConfig;
pub use engine::{ImageLoader, Interposer, ManualLoader};
pub use image::ImageHandle;
pub use memory::{Address, BinaryMemory};
pub use rebind::{apply_to_image, PreviousAddress, RebindError, RebindReport, Substitution};

/// Process-wide `submit_global` and the one-shot `apply_to_image` over a
/// live dyld image.
#[cfg(target_os = "macos")]
pub use engine::global;
#[cfg(target_os = "macos")]
pub use engine::DyldLoader;
