// Sat Jan 18 2026 - Alex

use crate::image::ImageHandle;
use parking_lot::RwLock;
use std::sync::Arc;

pub type LoadCallback = Arc<dyn Fn(&ImageHandle) + Send + Sync>;

/// The dynamic loader, as far as the interposer needs it.
pub trait ImageLoader: Send + Sync {
    /// Images mapped right now, in load order.
    fn loaded_images(&self) -> Vec<ImageHandle>;

    /// Registers `callback` for every future load. Before returning it must
    /// also have been called once for every image already mapped.
    fn register_load_callback(&self, callback: LoadCallback);
}

/// Loader whose images are mapped by hand: the offline inspector maps one file
/// image into it, and tests drive load events through it.
#[derive(Default)]
pub struct ManualLoader {
    images: RwLock<Vec<ImageHandle>>,
    callbacks: RwLock<Vec<LoadCallback>>,
}

impl ManualLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, image: ImageHandle) -> Self {
        self.images.write().push(image);
        self
    }

    /// Adds an image and notifies every registered callback.
    pub fn map_image(&self, image: ImageHandle) {
        self.images.write().push(image.clone());
        // Callbacks may call back into the loader.
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(&image);
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }
}

impl ImageLoader for ManualLoader {
    fn loaded_images(&self) -> Vec<ImageHandle> {
        self.images.read().clone()
    }

    fn register_load_callback(&self, callback: LoadCallback) {
        self.callbacks.write().push(callback.clone());
        for image in self.loaded_images() {
            callback(&image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Address;
    use parking_lot::Mutex;

    #[test]
    fn test_registration_replays_then_follows_loads() {
        let loader = ManualLoader::new()
            .with_image(ImageHandle::new(Address::new(0x1000), 0))
            .with_image(ImageHandle::new(Address::new(0x2000), 0x10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        loader.register_load_callback(Arc::new(move |image: &ImageHandle| sink.lock().push(image.header().as_u64())));

        assert_eq!(*seen.lock(), vec![0x1000, 0x2000]);
        loader.map_image(ImageHandle::new(Address::new(0x3000), 0));
        assert_eq!(*seen.lock(), vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(loader.loaded_images().len(), 3);
        assert_eq!(loader.callback_count(), 1);
    }
}
