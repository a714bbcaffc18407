// Tue Jan 13 2026 - Alex

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address {
    value: u64,
}

impl Address {
    pub const fn new(value: u64) -> Self {
        Self { value }
    }

    pub const fn zero() -> Self {
        Self { value: 0 }
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self { value: ptr as usize as u64 }
    }

    pub const fn as_u64(&self) -> u64 {
        self.value
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.value as usize as *const u8
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.value as usize as *mut u8
    }

    pub const fn is_null(&self) -> bool {
        self.value == 0
    }

    pub fn is_aligned(&self, alignment: usize) -> bool {
        self.value % alignment as u64 == 0
    }

    pub fn align_down(&self, alignment: usize) -> Self {
        Self { value: self.value & !(alignment as u64 - 1) }
    }

    pub fn align_up(&self, alignment: usize) -> Self {
        // Saturates at the top of the address space.
        Self { value: self.value.saturating_add(alignment as u64 - 1) & !(alignment as u64 - 1) }
    }

    pub fn checked_add(&self, rhs: u64) -> Option<Self> {
        self.value.checked_add(rhs).map(Self::new)
    }

    pub fn distance(&self, other: Self) -> i64 {
        self.value.wrapping_sub(other.value) as i64
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.value)
    }
}

/// Unchecked. Image-derived offsets go through `checked_add` first.
impl Add<u64> for Address {
    type Output = Self;
    fn add(self, rhs: u64) -> Self::Output {
        Self { value: self.value + rhs }
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        addr.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let addr = Address::new(0x1234);
        assert_eq!(addr.align_down(0x1000), Address::new(0x1000));
        assert_eq!(addr.align_up(0x1000), Address::new(0x2000));
        assert!(Address::new(0x1008).is_aligned(8));
        assert!(!addr.is_aligned(8));
        assert_eq!(Address::new(u64::MAX - 8).align_up(0x1000), Address::new(u64::MAX & !0xfff));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert!(Address::new(u64::MAX).checked_add(1).is_none());
        assert_eq!(Address::new(1).checked_add(1), Some(Address::new(2)));
    }
}
