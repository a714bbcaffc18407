// Fri Jan 17 2026 - Alex

use crate::memory::Address;
use crate::rebind::RebindError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Shared cell that receives the address a slot held before it was rebound.
///
/// Clones share the same cell, so the caller keeps one handle and passes
/// another into a [`Substitution`]. The cell is written every time a slot
/// holding something other than the replacement is rebound, so after several
/// scans it holds the value seen by the latest one.
#[derive(Clone, Default)]
pub struct PreviousAddress(Arc<Mutex<Option<Address>>>);

impl PreviousAddress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Address> {
        *self.0.lock()
    }

    pub(crate) fn store(&self, address: Address) {
        *self.0.lock() = Some(address);
    }
}

impl fmt::Debug for PreviousAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(addr) => write!(f, "PreviousAddress({})", addr),
            None => write!(f, "PreviousAddress(unset)"),
        }
    }
}

/// A request to point every import of `name` at `replacement`.
///
/// `name` is the symbol as written in source, without the leading underscore
/// the object format adds. A request with a library only applies to imports
/// bound to that exact install name.
#[derive(Debug, Clone)]
pub struct Substitution {
    name: String,
    library: Option<String>,
    replacement: Address,
    previous: Option<PreviousAddress>,
}

impl Substitution {
    pub fn new(name: impl Into<String>, replacement: Address) -> Self {
        Self {
            name: name.into(),
            library: None,
            replacement,
            previous: None,
        }
    }

    pub fn from_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn capture_previous(mut self, previous: &PreviousAddress) -> Self {
        self.previous = Some(previous.clone());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn replacement(&self) -> Address {
        self.replacement
    }

    pub fn previous(&self) -> Option<&PreviousAddress> {
        self.previous.as_ref()
    }

    pub fn validate(&self) -> Result<(), RebindError> {
        if self.name.is_empty() {
            return Err(RebindError::InvalidSubstitution("symbol name is empty".to_string()));
        }
        if self.name.contains('\0') {
            return Err(RebindError::InvalidSubstitution(format!(
                "symbol name {:?} contains a NUL byte",
                self.name
            )));
        }
        if matches!(self.library.as_deref(), Some("")) {
            return Err(RebindError::InvalidSubstitution(format!(
                "empty library name for {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Compares against a raw symbol table name, ignoring its first byte.
    pub fn matches_symbol(&self, raw_name: &[u8]) -> bool {
        raw_name.len() >= 2 && &raw_name[1..] == self.name.as_bytes()
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library {
            Some(lib) => write!(f, "{}@{} -> {}", self.name, lib, self.replacement),
            None => write!(f, "{} -> {}", self.name, self.replacement),
        }
    }
}

/// Requests submitted together. Immutable once built.
#[derive(Debug, Clone)]
pub struct SubstitutionBatch {
    requests: Vec<Substitution>,
}

impl SubstitutionBatch {
    pub fn new(requests: Vec<Substitution>) -> Result<Self, RebindError> {
        for request in &requests {
            request.validate()?;
        }
        Ok(Self { requests })
    }

    pub fn requests(&self) -> &[Substitution] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn has_unconstrained(&self) -> bool {
        self.requests.iter().any(|r| r.library.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_symbol_strips_first_byte() {
        let sub = Substitution::new("fprintf", Address::new(0x1000));
        assert!(sub.matches_symbol(b"_fprintf"));
        assert!(sub.matches_symbol(b"$fprintf"));
        assert!(!sub.matches_symbol(b"fprintf"));
        assert!(!sub.matches_symbol(b"_fprintf$UNIX2003"));
        assert!(!sub.matches_symbol(b"_"));
        assert!(!sub.matches_symbol(b""));
    }

    #[test]
    fn test_validation() {
        assert!(Substitution::new("", Address::new(1)).validate().is_err());
        assert!(Substitution::new("a\0b", Address::new(1)).validate().is_err());
        assert!(Substitution::new("open", Address::new(1)).from_library("").validate().is_err());
        assert!(Substitution::new("open", Address::new(1))
            .from_library("/usr/lib/libSystem.B.dylib")
            .validate()
            .is_ok());

        let batch = SubstitutionBatch::new(vec![
            Substitution::new("open", Address::new(1)),
            Substitution::new("", Address::new(2)),
        ]);
        assert!(matches!(batch, Err(RebindError::InvalidSubstitution(_))));
    }

    #[test]
    fn test_previous_address_is_shared() {
        let previous = PreviousAddress::new();
        let sub = Substitution::new("close", Address::new(0x2000)).capture_previous(&previous);
        assert_eq!(previous.get(), None);
        sub.previous().unwrap().store(Address::new(0x1234));
        assert_eq!(previous.get(), Some(Address::new(0x1234)));
    }

    #[test]
    fn test_batch_reports_unconstrained_requests() {
        let constrained = SubstitutionBatch::new(vec![
            Substitution::new("fopen", Address::new(1)).from_library("/usr/lib/libSystem.B.dylib"),
        ])
        .unwrap();
        assert!(!constrained.has_unconstrained());

        let mixed = SubstitutionBatch::new(vec![
            Substitution::new("fopen", Address::new(1)).from_library("/usr/lib/libSystem.B.dylib"),
            Substitution::new("fprintf", Address::new(2)),
        ])
        .unwrap();
        assert!(mixed.has_unconstrained());
        assert_eq!(mixed.len(), 2);
    }
}
