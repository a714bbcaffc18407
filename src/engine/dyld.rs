// Sat Jan 18 2026 - Alex

//! dyld-backed `ImageLoader` for the current process.

use crate::engine::loader::{ImageLoader, LoadCallback};
use crate::image::ImageHandle;
use crate::memory::Address;
use libc::{c_void, dladdr, Dl_info};
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::ffi::CStr;

extern "C" {
    fn _dyld_image_count() -> u32;
    fn _dyld_get_image_header(index: u32) -> *const c_void;
    fn _dyld_get_image_vmaddr_slide(index: u32) -> isize;
    fn _dyld_register_func_for_add_image(func: extern "C" fn(*const c_void, isize));
}

/// dyld offers no way to unregister, so the trampoline is installed once and
/// fans out to every callback registered through any `DyldLoader`.
static CALLBACKS: Lazy<RwLock<Vec<LoadCallback>>> = Lazy::new(|| RwLock::new(Vec::new()));
static TRAMPOLINE_INSTALLED: Mutex<bool> = parking_lot::const_mutex(false);

extern "C" fn on_add_image(header: *const c_void, slide: isize) {
    let image = match known_image(header, slide) {
        Some(image) => image,
        None => {
            debug!("dyld reported {:p}, which dladdr does not know", header);
            return;
        }
    };
    let callbacks = CALLBACKS.read().clone();
    for callback in callbacks {
        callback(&image);
    }
}

/// Builds a handle for `header` if dladdr attributes it to a loaded image.
pub(crate) fn known_image(header: *const c_void, slide: isize) -> Option<ImageHandle> {
    if header.is_null() {
        return None;
    }
    let mut info: Dl_info = unsafe { std::mem::zeroed() };
    if unsafe { dladdr(header, &mut info) } == 0 {
        return None;
    }
    let handle = ImageHandle::new(Address::from_ptr(header), slide as i64);
    if info.dli_fname.is_null() {
        return Some(handle);
    }
    let path = unsafe { CStr::from_ptr(info.dli_fname) }.to_string_lossy().into_owned();
    Some(handle.with_path(path))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DyldLoader;

impl DyldLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ImageLoader for DyldLoader {
    fn loaded_images(&self) -> Vec<ImageHandle> {
        let count = unsafe { _dyld_image_count() };
        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            let header = unsafe { _dyld_get_image_header(index) };
            let slide = unsafe { _dyld_get_image_vmaddr_slide(index) };
            match known_image(header, slide) {
                Some(image) => images.push(image),
                None => debug!("dyld image {} at {:p} is unknown to dladdr", index, header),
            }
        }
        images
    }

    fn register_load_callback(&self, callback: LoadCallback) {
        CALLBACKS.write().push(callback.clone());

        let mut installed = TRAMPOLINE_INSTALLED.lock();
        if !*installed {
            *installed = true;
            drop(installed);
            info!("Installing dyld add-image callback");
            // dyld calls the trampoline for every image already loaded
            // before this returns.
            unsafe { _dyld_register_func_for_add_image(on_add_image) };
            return;
        }
        drop(installed);

        for image in self.loaded_images() {
            callback(&image);
        }
    }
}
