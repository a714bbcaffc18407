// Fri Jan 17 2026 - Alex

use crate::rebind::{RebindError, Substitution, SubstitutionBatch};
use parking_lot::Mutex;
use std::sync::Arc;

/// Append-only list of every batch ever submitted.
///
/// Scans never hold the lock while touching an image; they work from a
/// snapshot taken up front, so a submission racing a loader callback either
/// lands in that scan or in the rescan its own submit triggers.
#[derive(Debug, Default)]
pub struct SubstitutionTable {
    batches: Mutex<Vec<Arc<SubstitutionBatch>>>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links a new batch. Returns the number of batches now in the table.
    pub fn submit(&self, requests: Vec<Substitution>) -> Result<usize, RebindError> {
        let requested = requests.len();
        let batch = Arc::new(SubstitutionBatch::new(requests)?);
        let mut batches = self.batches.lock();
        batches
            .try_reserve(1)
            .map_err(|_| RebindError::OutOfMemory { requested })?;
        batches.push(batch);
        Ok(batches.len())
    }

    /// Batches newest first.
    pub fn snapshot(&self) -> Vec<Arc<SubstitutionBatch>> {
        self.batches.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Address;

    #[test]
    fn test_snapshot_is_newest_first() {
        let table = SubstitutionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.submit(vec![Substitution::new("first", Address::new(1))]).unwrap(), 1);
        assert_eq!(table.submit(vec![Substitution::new("second", Address::new(2))]).unwrap(), 2);

        let snapshot = table.snapshot();
        assert_eq!(snapshot[0].requests()[0].name(), "second");
        assert_eq!(snapshot[1].requests()[0].name(), "first");
    }

    #[test]
    fn test_rejected_batch_is_not_linked() {
        let table = SubstitutionTable::new();
        let result = table.submit(vec![
            Substitution::new("ok", Address::new(1)),
            Substitution::new("", Address::new(2)),
        ]);
        assert!(result.is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_batch_is_accepted() {
        let table = SubstitutionTable::new();
        table.submit(Vec::new()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.snapshot()[0].is_empty());
    }
}
