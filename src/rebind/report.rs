// Fri Jan 17 2026 - Alex

use crate::image::{ImageError, ImageHandle};
use crate::memory::Address;
use crate::utils::pluralize;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Every request names a library this image does not link.
    NoMatchingLibrary,
    /// The loader does not recognise the header as a loaded image.
    UnknownImage,
    MissingMetadata(String),
    /// Parsing or writing failed. Rewrites made before the failure stand.
    Failed(String),
}

impl From<&ImageError> for SkipReason {
    fn from(err: &ImageError) -> Self {
        match err {
            ImageError::MissingMetadata(what) => Self::MissingMetadata((*what).to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingLibrary => write!(f, "no requested library is linked"),
            Self::UnknownImage => write!(f, "not a loaded image"),
            Self::MissingMetadata(what) => write!(f, "missing {}", what),
            Self::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRewrite {
    pub section: String,
    pub slot: Address,
    pub symbol: String,
    pub ordinal: u8,
    pub previous: Address,
    pub replacement: Address,
}

/// Outcome of running the table against one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebindReport {
    pub image: ImageHandle,
    pub skipped: Option<SkipReason>,
    pub rewrite_count: usize,
    /// Empty when rewrite recording is turned off.
    pub rewrites: Vec<SlotRewrite>,
    /// Read-only sections whose protection could not be lifted.
    pub locked_sections: Vec<String>,
}

impl RebindReport {
    pub fn new(image: ImageHandle) -> Self {
        Self {
            image,
            skipped: None,
            rewrite_count: 0,
            rewrites: Vec::new(),
            locked_sections: Vec::new(),
        }
    }

    pub fn skipped(image: ImageHandle, reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::new(image)
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

impl fmt::Display for RebindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rewritten = pluralize(self.rewrite_count, "slot", "slots");
        match &self.skipped {
            Some(reason) if self.rewrite_count == 0 => write!(f, "{}: skipped ({})", self.image, reason)?,
            Some(reason) => write!(f, "{}: {} rewritten, then {}", self.image, rewritten, reason)?,
            None => write!(f, "{}: {} rewritten", self.image, rewritten)?,
        }
        if !self.locked_sections.is_empty() {
            write!(f, "; could not unlock {}", self.locked_sections.join(", "))?;
        }
        Ok(())
    }
}
