// Sat Jan 18 2026 - Alex

use crate::config::EngineConfig;
use crate::engine::loader::ImageLoader;
use crate::image::ImageHandle;
use crate::memory::MemoryView;
use crate::rebind::{self, RebindError, RebindReport, Substitution, SubstitutionTable};
use log::{debug, info};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ReportObserver = Arc<dyn Fn(&RebindReport) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterposerState {
    Unregistered,
    Registered,
}

/// State reachable from loader callbacks. Kept apart from the loader so a
/// callback holding it does not keep the loader alive.
struct Shared {
    table: SubstitutionTable,
    memory: Arc<dyn MemoryView>,
    config: EngineConfig,
    observer: RwLock<Option<ReportObserver>>,
}

impl Shared {
    fn scan(&self, image: &ImageHandle) -> RebindReport {
        let snapshot = self.table.snapshot();
        let report = rebind::rebind_image(self.memory.as_ref(), image, &snapshot, &self.config);
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer(&report);
        }
        report
    }
}

/// Owns the substitution table and keeps every loaded image rebound
/// against it.
pub struct Interposer {
    shared: Arc<Shared>,
    loader: Arc<dyn ImageLoader>,
    registered: AtomicBool,
}

impl Interposer {
    pub fn new(
        memory: Arc<dyn MemoryView>,
        loader: Arc<dyn ImageLoader>,
        config: EngineConfig,
    ) -> Result<Self, RebindError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                table: SubstitutionTable::new(),
                memory,
                config,
                observer: RwLock::new(None),
            }),
            loader,
            registered: AtomicBool::new(false),
        })
    }

    /// Receives the report of every scan, including scans run from loader
    /// callbacks.
    pub fn with_observer<F>(self, observer: F) -> Self
    where
        F: Fn(&RebindReport) + Send + Sync + 'static,
    {
        *self.shared.observer.write() = Some(Arc::new(observer));
        self
    }

    pub fn state(&self) -> InterposerState {
        if self.registered.load(Ordering::Acquire) {
            InterposerState::Registered
        } else {
            InterposerState::Unregistered
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.shared.table
    }

    /// Links a batch into the table and brings every loaded image up to
    /// date with it before returning.
    ///
    /// The first batch subscribes to load events, which replays the images
    /// already mapped. Later batches rescan those images directly.
    pub fn submit(&self, requests: Vec<Substitution>) -> Result<(), RebindError> {
        let count = self.shared.table.submit(requests)?;
        debug!("Substitution table holds {} batches", count);

        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("Registering for image load notifications");
            let shared = Arc::clone(&self.shared);
            self.loader
                .register_load_callback(Arc::new(move |image: &ImageHandle| {
                    shared.scan(image);
                }));
        } else {
            self.rescan_loaded();
        }
        Ok(())
    }

    pub fn rescan_loaded(&self) -> Vec<RebindReport> {
        self.loader
            .loaded_images()
            .iter()
            .map(|image| self.shared.scan(image))
            .collect()
    }

    /// Runs the whole table against one newly mapped image.
    pub fn on_image_loaded(&self, image: &ImageHandle) -> RebindReport {
        self.shared.scan(image)
    }

    /// Runs `requests` against `image` alone. Nothing is added to the table.
    pub fn apply_to_image(
        &self,
        image: &ImageHandle,
        requests: Vec<Substitution>,
    ) -> Result<RebindReport, RebindError> {
        rebind::apply_to_image(self.shared.memory.as_ref(), image, requests, &self.shared.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::ManualLoader;
    use crate::memory::{Address, BinaryMemory, MemoryReader};
    use crate::rebind::PreviousAddress;
    use crate::utils::testing::{MachOBuilder, SectionKind};
    use parking_lot::Mutex;

    const LIBSYSTEM: &str = "/usr/lib/libSystem.B.dylib";

    struct Harness {
        memory: Arc<BinaryMemory>,
        loader: Arc<ManualLoader>,
        interposer: Interposer,
        reports: Arc<Mutex<Vec<RebindReport>>>,
        slot: Address,
    }

    impl Harness {
        fn new(with_image: bool) -> Self {
            let built = MachOBuilder::new()
                .dylib(LIBSYSTEM)
                .import("_write", 1)
                .import("_read", 1)
                .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0x5000), (1, 0x6000)])
                .build_image();
            let memory = Arc::new(BinaryMemory::from_macho_bytes(&built.bytes, BinaryMemory::DEFAULT_BASE).unwrap());
            let image = memory.image();
            let slot = image.runtime_address(built.section_addr("__la_symbol_ptr")).unwrap();

            let loader = Arc::new(ManualLoader::new());
            if with_image {
                loader.map_image(image);
            }
            let reports = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&reports);
            let interposer = Interposer::new(
                memory.clone() as Arc<dyn MemoryView>,
                loader.clone() as Arc<dyn ImageLoader>,
                EngineConfig::default(),
            )
            .unwrap()
            .with_observer(move |report| sink.lock().push(report.clone()));

            Self {
                memory,
                loader,
                interposer,
                reports,
                slot,
            }
        }

        fn slot_value(&self, index: u64) -> u64 {
            self.memory.read_u64(self.slot + index * 8).unwrap()
        }

        fn report_count(&self) -> usize {
            self.reports.lock().len()
        }
    }

    #[test]
    fn test_first_submit_registers_and_replays() {
        let harness = Harness::new(true);
        assert_eq!(harness.interposer.state(), InterposerState::Unregistered);

        harness
            .interposer
            .submit(vec![Substitution::new("write", Address::new(0xaaaa))])
            .unwrap();

        assert_eq!(harness.interposer.state(), InterposerState::Registered);
        assert_eq!(harness.loader.callback_count(), 1);
        assert_eq!(harness.report_count(), 1);
        assert_eq!(harness.slot_value(0), 0xaaaa);
        assert_eq!(harness.slot_value(1), 0x6000);
    }

    #[test]
    fn test_later_submit_rescans_without_registering_again() {
        let harness = Harness::new(true);
        harness
            .interposer
            .submit(vec![Substitution::new("write", Address::new(0xaaaa))])
            .unwrap();
        harness
            .interposer
            .submit(vec![Substitution::new("read", Address::new(0xbbbb))])
            .unwrap();

        assert_eq!(harness.loader.callback_count(), 1);
        assert_eq!(harness.report_count(), 2);
        assert_eq!(harness.slot_value(0), 0xaaaa);
        assert_eq!(harness.slot_value(1), 0xbbbb);
        assert_eq!(harness.interposer.table().len(), 2);
    }

    #[test]
    fn test_image_loaded_after_registration_gets_full_table() {
        let harness = Harness::new(false);
        harness
            .interposer
            .submit(vec![Substitution::new("write", Address::new(0xaaaa))])
            .unwrap();
        harness
            .interposer
            .submit(vec![Substitution::new("read", Address::new(0xbbbb))])
            .unwrap();
        assert_eq!(harness.report_count(), 0);

        harness.loader.map_image(harness.memory.image());

        assert_eq!(harness.report_count(), 1);
        assert_eq!(harness.reports.lock()[0].rewrite_count, 2);
        assert_eq!(harness.slot_value(0), 0xaaaa);
        assert_eq!(harness.slot_value(1), 0xbbbb);
    }

    #[test]
    fn test_resubmitting_same_name_chains_previous() {
        let harness = Harness::new(true);
        let first = PreviousAddress::new();
        let second = PreviousAddress::new();
        harness
            .interposer
            .submit(vec![Substitution::new("write", Address::new(0x100)).capture_previous(&first)])
            .unwrap();
        harness
            .interposer
            .submit(vec![Substitution::new("write", Address::new(0x200)).capture_previous(&second)])
            .unwrap();

        assert_eq!(first.get(), Some(Address::new(0x5000)));
        assert_eq!(second.get(), Some(Address::new(0x100)));
        assert_eq!(harness.slot_value(0), 0x200);

        // a later rescan finds the newest replacement already in place
        let reports = harness.interposer.rescan_loaded();
        assert_eq!(reports.len(), 1);
        assert_eq!(second.get(), Some(Address::new(0x100)));
        assert_eq!(harness.slot_value(0), 0x200);
    }

    #[test]
    fn test_rejected_batch_leaves_state_alone() {
        let harness = Harness::new(true);
        let result = harness.interposer.submit(vec![Substitution::new("", Address::new(1))]);
        assert!(result.is_err());
        assert_eq!(harness.interposer.state(), InterposerState::Unregistered);
        assert!(harness.interposer.table().is_empty());
    }

    #[test]
    fn test_apply_to_image_bypasses_table() {
        let harness = Harness::new(true);
        let report = harness
            .interposer
            .apply_to_image(&harness.memory.image(), vec![Substitution::new("read", Address::new(0xcccc))])
            .unwrap();
        assert_eq!(report.rewrite_count, 1);
        assert_eq!(harness.slot_value(1), 0xcccc);
        assert!(harness.interposer.table().is_empty());
        assert_eq!(harness.interposer.state(), InterposerState::Unregistered);

        let report = harness.interposer.on_image_loaded(&harness.memory.image());
        assert_eq!(report.rewrite_count, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let memory = Arc::new(
            BinaryMemory::from_macho_bytes(&MachOBuilder::new().build(), BinaryMemory::DEFAULT_BASE).unwrap(),
        );
        let result = Interposer::new(
            memory as Arc<dyn MemoryView>,
            Arc::new(ManualLoader::new()) as Arc<dyn ImageLoader>,
            EngineConfig::default().with_data_segments(Vec::new()),
        );
        assert!(matches!(result, Err(RebindError::Config(_))));
    }
}
