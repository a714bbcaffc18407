// Tue Jan 13 2026 - Alex

use crate::image::constants::{SEG_DATA, SEG_DATA_CONST, SEG_LINKEDIT};
use crate::rebind::RebindError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Segments whose symbol pointer sections get rewritten.
    pub data_segments: Vec<String>,
    pub linkedit_segment: String,
    pub restore_protection: bool,
    pub record_rewrites: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_segments: vec![SEG_DATA.to_string(), SEG_DATA_CONST.to_string()],
            linkedit_segment: SEG_LINKEDIT.to_string(),
            restore_protection: true,
            record_rewrites: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, RebindError> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| RebindError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| RebindError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_segments(mut self, segments: Vec<String>) -> Self {
        self.data_segments = segments;
        self
    }

    pub fn with_linkedit_segment(mut self, segment: impl Into<String>) -> Self {
        self.linkedit_segment = segment.into();
        self
    }

    pub fn with_restore_protection(mut self, restore: bool) -> Self {
        self.restore_protection = restore;
        self
    }

    pub fn with_record_rewrites(mut self, record: bool) -> Self {
        self.record_rewrites = record;
        self
    }

    pub fn validate(&self) -> Result<(), RebindError> {
        if self.data_segments.is_empty() {
            return Err(RebindError::Config("data_segments must not be empty".to_string()));
        }
        // Segment names are fixed 16-byte fields.
        for name in self.data_segments.iter().chain(std::iter::once(&self.linkedit_segment)) {
            if name.is_empty() || name.len() > 16 {
                return Err(RebindError::Config(format!("invalid segment name {:?}", name)));
            }
        }
        if self.data_segments.contains(&self.linkedit_segment) {
            return Err(RebindError::Config(format!(
                "{} cannot be both a data and the link-edit segment",
                self.linkedit_segment
            )));
        }
        Ok(())
    }
}
