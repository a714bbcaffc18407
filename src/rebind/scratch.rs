// Fri Jan 17 2026 - Alex

use crate::image::LinkedLibrary;
use crate::rebind::SubstitutionBatch;
use std::sync::Arc;

/// Library ordinals resolved for one image, one entry per request of every
/// batch in the snapshot being scanned. Lives for a single scan.
#[derive(Debug, Clone, Default)]
pub struct OrdinalScratch {
    ordinals: Vec<Vec<Option<u32>>>,
    any_resolved: bool,
    any_unconstrained: bool,
}

impl OrdinalScratch {
    /// Resolves each constrained request against the image's libraries. When
    /// the same install name is linked twice the later command wins.
    pub fn resolve(batches: &[Arc<SubstitutionBatch>], libraries: &[LinkedLibrary]) -> Self {
        let mut scratch = Self::default();
        for batch in batches {
            let mut row = Vec::with_capacity(batch.len());
            for request in batch.requests() {
                let ordinal = match request.library() {
                    None => {
                        scratch.any_unconstrained = true;
                        None
                    }
                    Some(wanted) => libraries
                        .iter()
                        .rev()
                        .find(|lib| lib.name == wanted)
                        .map(|lib| lib.ordinal),
                };
                scratch.any_resolved |= ordinal.is_some();
                row.push(ordinal);
            }
            scratch.ordinals.push(row);
        }
        scratch
    }

    pub fn ordinal(&self, batch: usize, request: usize) -> Option<u32> {
        self.ordinals.get(batch).and_then(|row| row.get(request)).copied().flatten()
    }

    /// False when no request can match anything in this image.
    pub fn worth_scanning(&self) -> bool {
        self.any_resolved || self.any_unconstrained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Address;
    use crate::rebind::Substitution;

    fn libs() -> Vec<LinkedLibrary> {
        vec![
            LinkedLibrary {
                ordinal: 1,
                name: "/usr/lib/libSystem.B.dylib".to_string(),
            },
            LinkedLibrary {
                ordinal: 2,
                name: "/usr/lib/libc++.1.dylib".to_string(),
            },
        ]
    }

    fn batch(requests: Vec<Substitution>) -> Arc<SubstitutionBatch> {
        Arc::new(SubstitutionBatch::new(requests).unwrap())
    }

    #[test]
    fn test_resolves_constrained_requests() {
        let batches = vec![
            batch(vec![
                Substitution::new("a", Address::new(1)).from_library("/usr/lib/libc++.1.dylib"),
                Substitution::new("b", Address::new(1)).from_library("/usr/lib/libz.dylib"),
            ]),
            batch(vec![Substitution::new("c", Address::new(1)).from_library("/usr/lib/libSystem.B.dylib")]),
        ];
        let scratch = OrdinalScratch::resolve(&batches, &libs());
        assert_eq!(scratch.ordinal(0, 0), Some(2));
        assert_eq!(scratch.ordinal(0, 1), None);
        assert_eq!(scratch.ordinal(1, 0), Some(1));
        assert_eq!(scratch.ordinal(5, 0), None);
        assert!(scratch.worth_scanning());
    }

    #[test]
    fn test_skip_when_nothing_can_match() {
        let batches = vec![batch(vec![
            Substitution::new("a", Address::new(1)).from_library("/usr/lib/libz.dylib")
        ])];
        assert!(!OrdinalScratch::resolve(&batches, &libs()).worth_scanning());
        assert!(!OrdinalScratch::resolve(&batches, &[]).worth_scanning());
    }

    #[test]
    fn test_unconstrained_forces_scan() {
        let batches = vec![batch(vec![Substitution::new("a", Address::new(1))])];
        let scratch = OrdinalScratch::resolve(&batches, &[]);
        assert!(scratch.worth_scanning());
        assert_eq!(scratch.ordinal(0, 0), None);
    }

    #[test]
    fn test_duplicate_install_name_takes_later_ordinal() {
        let mut linked = libs();
        linked.push(LinkedLibrary {
            ordinal: 3,
            name: "/usr/lib/libSystem.B.dylib".to_string(),
        });
        let batches = vec![batch(vec![
            Substitution::new("a", Address::new(1)).from_library("/usr/lib/libSystem.B.dylib")
        ])];
        assert_eq!(OrdinalScratch::resolve(&batches, &linked).ordinal(0, 0), Some(3));
    }
}
