// Fri Jan 17 2026 - Alex

use crate::config::EngineConfig;
use crate::image::constants::is_reserved_indirect_index;
use crate::image::{ImageError, ImageHandle, LinkTables, PointerSection};
use crate::memory::{Address, MemoryRange, MemoryReader, MemoryView};
use crate::rebind::{OrdinalScratch, RebindReport, SlotRewrite, Substitution, SubstitutionBatch};
use log::{trace, warn};
use std::sync::Arc;

/// An indirection slot whose indirect entry names a real symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub index: u64,
    pub address: Address,
    /// Name as stored in the string table, leading underscore included.
    pub raw_name: String,
    pub ordinal: u8,
}

impl ResolvedSlot {
    pub fn symbol(&self) -> &str {
        self.raw_name.get(1..).unwrap_or("")
    }
}

/// Resolves slot `index` of `section`. Slots whose indirect entry is
/// reserved, or whose symbol or name falls outside the tables, or whose name
/// is shorter than two bytes, yield `None`.
pub fn resolve_slot<M: MemoryReader + ?Sized>(
    memory: &M,
    image: &ImageHandle,
    tables: &LinkTables,
    section: &PointerSection,
    index: u64,
) -> Result<Option<ResolvedSlot>, ImageError> {
    let entry_index = u64::from(section.reserved1) + index;
    let entry_index = u32::try_from(entry_index).map_err(|_| ImageError::Overflow("indirect symbol index"))?;
    let symbol_index = match tables.indirect_entry(memory, entry_index)? {
        Some(index) if !is_reserved_indirect_index(index) => index,
        _ => return Ok(None),
    };
    let symbol = match tables.symbol(memory, symbol_index)? {
        Some(symbol) => symbol,
        None => return Ok(None),
    };
    let raw_name = match tables.symbol_name(memory, symbol.n_strx)? {
        Some(name) if name.len() >= 2 => name,
        _ => return Ok(None),
    };
    let address = section.slot_address(image, tables.width, index)?;
    Ok(Some(ResolvedSlot {
        index,
        address,
        raw_name,
        ordinal: symbol.library_ordinal(),
    }))
}

/// Rewrites the slots of one image against a table snapshot.
pub struct SlotRewriter<'a, M: MemoryView + ?Sized> {
    memory: &'a M,
    image: &'a ImageHandle,
    tables: &'a LinkTables,
    batches: &'a [Arc<SubstitutionBatch>],
    scratch: &'a OrdinalScratch,
    config: &'a EngineConfig,
}

impl<'a, M: MemoryView + ?Sized> SlotRewriter<'a, M> {
    pub fn new(
        memory: &'a M,
        image: &'a ImageHandle,
        tables: &'a LinkTables,
        batches: &'a [Arc<SubstitutionBatch>],
        scratch: &'a OrdinalScratch,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            memory,
            image,
            tables,
            batches,
            scratch,
            config,
        }
    }

    /// Newest batch first, requests in submission order, first match wins.
    pub fn find_match(&self, raw_name: &[u8], ordinal: u8) -> Option<&'a Substitution> {
        for (batch_idx, batch) in self.batches.iter().enumerate() {
            for (request_idx, request) in batch.requests().iter().enumerate() {
                let library_matches = match request.library() {
                    None => true,
                    Some(_) => self.scratch.ordinal(batch_idx, request_idx) == Some(u32::from(ordinal)),
                };
                if library_matches && request.matches_symbol(raw_name) {
                    return Some(request);
                }
            }
        }
        None
    }

    /// Rewrites every matching slot of one section. A section that cannot be
    /// made writable is left alone and listed in the report; only malformed
    /// metadata is returned as an error.
    pub fn rewrite_section(&self, section: &PointerSection, report: &mut RebindReport) -> Result<(), ImageError> {
        let range = self.tables.check_section(self.image, section)?;
        let mut unlocked = false;

        let result = self.rewrite_slots(section, range, report, &mut unlocked);

        if unlocked && self.config.restore_protection {
            if let Err(err) = self.memory.protect(range, section.segment_protection) {
                warn!(
                    "Could not restore {} on {} in {}: {}",
                    section.segment_protection,
                    section.qualified_name(),
                    self.image,
                    err
                );
            }
        }
        result
    }

    fn rewrite_slots(
        &self,
        section: &PointerSection,
        range: MemoryRange,
        report: &mut RebindReport,
        unlocked: &mut bool,
    ) -> Result<(), ImageError> {
        let width = self.tables.width;
        for index in 0..section.slot_count(width) {
            let slot = match resolve_slot(self.memory, self.image, self.tables, section, index)? {
                Some(slot) => slot,
                None => continue,
            };
            let request = match self.find_match(slot.raw_name.as_bytes(), slot.ordinal) {
                Some(request) => request,
                None => continue,
            };

            let replacement = request.replacement();
            if !width.fits(replacement.as_u64()) {
                warn!(
                    "{} does not fit the {}-byte pointers of {}, leaving {}",
                    replacement,
                    width.bytes(),
                    self.image,
                    slot.raw_name
                );
                continue;
            }

            if !*unlocked && !section.segment_protection.can_write() {
                if let Err(err) = self.memory.protect(range, section.segment_protection.with_write()) {
                    warn!(
                        "Could not make {} writable in {}, leaving it untouched: {}",
                        section.qualified_name(),
                        self.image,
                        err
                    );
                    report.locked_sections.push(section.qualified_name());
                    return Ok(());
                }
                *unlocked = true;
            }

            let current = width.read(self.memory, slot.address)?;
            if let Some(previous) = request.previous() {
                if current != replacement.as_u64() {
                    previous.store(Address::new(current));
                }
            }
            width.write(self.memory, slot.address, replacement.as_u64())?;

            trace!(
                "{} {}[{}] {} {:#x} -> {}",
                self.image,
                section.qualified_name(),
                index,
                slot.raw_name,
                current,
                replacement
            );
            report.rewrite_count += 1;
            if self.config.record_rewrites {
                report.rewrites.push(SlotRewrite {
                    section: section.qualified_name(),
                    slot: slot.address,
                    symbol: slot.symbol().to_string(),
                    ordinal: slot.ordinal,
                    previous: Address::new(current),
                    replacement,
                });
            }
        }
        Ok(())
    }
}
