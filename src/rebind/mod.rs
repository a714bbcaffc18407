// Fri Jan 17 2026 - Alex

//! Matching imported symbols against substitution requests and rewriting
//! the pointer slots they are called through.

pub mod error;
pub mod report;
pub mod rewriter;
pub mod scratch;
pub mod substitution;
pub mod table;

pub use error::RebindError;
pub use report::{RebindReport, SkipReason, SlotRewrite};
pub use rewriter::{resolve_slot, ResolvedSlot, SlotRewriter};
pub use scratch::OrdinalScratch;
pub use substitution::{PreviousAddress, Substitution, SubstitutionBatch};
pub use table::SubstitutionTable;

use crate::config::EngineConfig;
use crate::image::{ImageError, ImageHandle, ImageMetadata};
use crate::memory::{Address, MemoryReader, MemoryView};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Runs `batches` (newest first) against one image.
///
/// Never fails: an image that cannot be scanned comes back as a skipped
/// report, and a failure partway through keeps the rewrites already made.
pub fn rebind_image<M: MemoryView + ?Sized>(
    memory: &M,
    image: &ImageHandle,
    batches: &[Arc<SubstitutionBatch>],
    config: &EngineConfig,
) -> RebindReport {
    let metadata = match ImageMetadata::parse(memory, image, config) {
        Ok(metadata) => metadata,
        Err(err) => return skip(image, &err),
    };

    let scratch = OrdinalScratch::resolve(batches, &metadata.libraries);
    if !scratch.worth_scanning() {
        return RebindReport::skipped(image.clone(), SkipReason::NoMatchingLibrary);
    }

    let tables = match metadata.link_tables(image) {
        Ok(tables) => tables,
        Err(err) => return skip(image, &err),
    };

    let rewriter = SlotRewriter::new(memory, image, &tables, batches, &scratch, config);
    let mut report = RebindReport::new(image.clone());
    for section in &metadata.pointer_sections {
        if let Err(err) = rewriter.rewrite_section(section, &mut report) {
            debug!("Stopped rebinding {} at {}: {}", image, section.qualified_name(), err);
            report.skipped = Some(SkipReason::from(&err));
            break;
        }
    }
    debug!("{}", report);
    report
}

fn skip(image: &ImageHandle, err: &ImageError) -> RebindReport {
    debug!("Skipping {}: {}", image, err);
    RebindReport::skipped(image.clone(), SkipReason::from(err))
}

/// One-shot variant: runs a fresh batch against a single image without
/// touching any table.
pub fn apply_to_image<M: MemoryView + ?Sized>(
    memory: &M,
    image: &ImageHandle,
    requests: Vec<Substitution>,
    config: &EngineConfig,
) -> Result<RebindReport, RebindError> {
    let batch = Arc::new(SubstitutionBatch::new(requests)?);
    Ok(rebind_image(memory, image, &[batch], config))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectSlot {
    pub section: String,
    pub address: Address,
    pub symbol: String,
    pub ordinal: u8,
    pub library: Option<String>,
    pub value: Address,
}

/// Every resolvable indirection slot in the image, without writing anything.
pub fn list_indirect_slots<M: MemoryReader + ?Sized>(
    memory: &M,
    image: &ImageHandle,
    config: &EngineConfig,
) -> Result<Vec<IndirectSlot>, ImageError> {
    let metadata = ImageMetadata::parse(memory, image, config)?;
    let tables = metadata.link_tables(image)?;
    let mut slots = Vec::new();
    for section in &metadata.pointer_sections {
        tables.check_section(image, section)?;
        for index in 0..section.slot_count(tables.width) {
            let slot = match resolve_slot(memory, image, &tables, section, index)? {
                Some(slot) => slot,
                None => continue,
            };
            slots.push(IndirectSlot {
                section: section.qualified_name(),
                address: slot.address,
                symbol: slot.symbol().to_string(),
                ordinal: slot.ordinal,
                library: metadata.library(u32::from(slot.ordinal)).map(|lib| lib.name.clone()),
                value: Address::new(tables.width.read(memory, slot.address)?),
            });
        }
    }
    Ok(slots)
}
