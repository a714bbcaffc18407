// Sat Jan 18 2026 - Alex

//! Process-wide entry points backed by one lazily built `Interposer` over
//! the live address space and dyld.

use crate::config::EngineConfig;
use crate::engine::core::Interposer;
use crate::engine::dyld::{known_image, DyldLoader};
use crate::engine::loader::ImageLoader;
use crate::image::ImageHandle;
use crate::memory::{Address, MemoryView, ProcessMemory};
use crate::rebind::{self, RebindError, RebindReport, SkipReason, Substitution, SubstitutionBatch};
use libc::c_void;
use log::debug;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static INTERPOSER: OnceCell<Interposer> = OnceCell::new();

pub fn interposer() -> Result<&'static Interposer, RebindError> {
    INTERPOSER.get_or_try_init(|| {
        // Addresses only ever come from images dyld reports as loaded, and
        // images are never unloaded while registered.
        let memory: Arc<dyn MemoryView> = Arc::new(unsafe { ProcessMemory::new() });
        let loader: Arc<dyn ImageLoader> = Arc::new(DyldLoader::new());
        Interposer::new(memory, loader, EngineConfig::default())
    })
}

/// Adds `requests` to the process-wide table and rebinds every loaded image,
/// now and on every future load.
pub fn submit_global(requests: Vec<Substitution>) -> Result<(), RebindError> {
    interposer()?.submit(requests)
}

/// Rebinds a single image with `requests` only. A header dladdr cannot
/// attribute to a loaded image is reported as skipped and never read.
///
/// # Safety
///
/// `header` must be the Mach-O header of an image mapped in this process,
/// and `slide` the slide dyld applied to it.
pub unsafe fn apply_to_image(
    header: *const c_void,
    slide: isize,
    requests: Vec<Substitution>,
) -> Result<RebindReport, RebindError> {
    let batch = Arc::new(SubstitutionBatch::new(requests)?);
    let image = match known_image(header, slide) {
        Some(image) => image,
        None => {
            let image = ImageHandle::new(Address::from_ptr(header), slide as i64);
            debug!("Skipping {}: not a loaded image", image);
            return Ok(RebindReport::skipped(image, SkipReason::UnknownImage));
        }
    };
    let memory = ProcessMemory::new();
    Ok(rebind::rebind_image(&memory, &image, &[batch], &EngineConfig::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::InterposerState;

    #[test]
    fn test_global_interposer_is_shared() {
        let first = interposer().unwrap() as *const Interposer;
        let second = interposer().unwrap() as *const Interposer;
        assert_eq!(first, second);
    }

    #[test]
    fn test_submit_registers_with_dyld() {
        // a name nothing imports, so no slot in the test binary changes
        submit_global(vec![Substitution::new(
            "macho_rebind_no_such_symbol",
            Address::new(0x1000),
        )])
        .unwrap();
        assert_eq!(interposer().unwrap().state(), InterposerState::Registered);
    }

    #[test]
    fn test_unknown_header_is_skipped_unread() {
        // no mapping lives at page zero, so any read would fault
        let bogus = 0x10usize as *const c_void;
        let report = unsafe {
            apply_to_image(bogus, 0, vec![Substitution::new("write", Address::new(0x1000))])
        }
        .unwrap();
        assert_eq!(report.skipped, Some(SkipReason::UnknownImage));
        assert_eq!(report.rewrite_count, 0);

        let invalid = unsafe { apply_to_image(bogus, 0, vec![Substitution::new("", Address::new(1))]) };
        assert!(matches!(invalid, Err(RebindError::InvalidSubstitution(_))));
    }
}
