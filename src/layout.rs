//! Column layout of the shared feature vector.
//!
//! The vector is split into three contiguous zones:
//!
//! ```text
//! [ wifi: TOP_N * TOTAL_DEVICES | bt: TOTAL_DEVICES | people: TOTAL_DEVICES ]
//! ```
//!
//! Changing `top_n` or `total_devices` changes every column after device 0 and
//! invalidates any predictor trained against the previous layout.

use crate::error::AppError;
use std::ops::Range;

pub const DEFAULT_TOP_N_APS: usize = 5;
pub const DEFAULT_TOTAL_DEVICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    top_n: usize,
    total_devices: usize,
    column_offset: usize,
}

impl FeatureLayout {
    /// Layout for the live buffer, which has no leading columns.
    pub fn new(top_n: usize, total_devices: usize) -> Result<Self, AppError> {
        Self::with_offset(top_n, total_devices, 0)
    }

    /// Layout shifted right by `column_offset` leading non-feature columns
    /// (e.g. a timestamp column in an offline table).
    pub fn with_offset(
        top_n: usize,
        total_devices: usize,
        column_offset: usize,
    ) -> Result<Self, AppError> {
        if top_n == 0 {
            return Err(AppError::InvalidLayout("top_n must be at least 1".to_string()));
        }
        if total_devices == 0 {
            return Err(AppError::InvalidLayout(
                "total_devices must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            top_n,
            total_devices,
            column_offset,
        })
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn total_devices(&self) -> usize {
        self.total_devices
    }

    pub fn column_offset(&self) -> usize {
        self.column_offset
    }

    /// Number of feature columns, excluding the leading offset.
    pub fn width(&self) -> usize {
        self.top_n * self.total_devices + 2 * self.total_devices
    }

    /// All feature columns, offset included.
    pub fn feature_columns(&self) -> Range<usize> {
        self.column_offset..self.column_offset + self.width()
    }

    pub fn contains_device(&self, device_idx: usize) -> bool {
        device_idx < self.total_devices
    }

    pub fn wifi_columns(&self, device_idx: usize) -> Range<usize> {
        let start = self.column_offset + self.top_n * device_idx;
        start..start + self.top_n
    }

    pub fn bt_column(&self, device_idx: usize) -> usize {
        self.column_offset + self.top_n * self.total_devices + device_idx
    }

    pub fn bbox_column(&self, device_idx: usize) -> usize {
        self.column_offset + self.total_devices * (self.top_n + 1) + device_idx
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N_APS,
            total_devices: DEFAULT_TOTAL_DEVICES,
            column_offset: 0,
        }
    }
}
