//! Per-partition row buffers, reused across rows instead of reallocated.

/// Placeholder for "unset" values in features and outputs.
pub const SENTINEL: f32 = -999.0;

/// Feature vector for the current row, one slot per configured variable.
#[derive(Debug, Clone)]
pub struct FeatureBuffer {
    inner: Vec<f32>,
}

impl FeatureBuffer {
    /// Create a buffer with `len` slots set to the sentinel.
    pub fn new(len: usize) -> Self {
        Self {
            inner: vec![SENTINEL; len],
        }
    }

    /// Overwrite every slot with `read(slot)`, in slot order.
    pub fn load<F>(&mut self, mut read: F)
    where
        F: FnMut(usize) -> f32,
    {
        for (slot, value) in self.inner.iter_mut().enumerate() {
            *value = read(slot);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.inner
    }
}

/// The two output values written for a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSlot {
    pub max_score: f32,
    pub max_index: f32,
}

impl Default for OutputSlot {
    fn default() -> Self {
        Self {
            max_score: SENTINEL,
            max_index: SENTINEL,
        }
    }
}

impl OutputSlot {
    pub fn set(&mut self, score: f32, index: usize) {
        self.max_score = score;
        self.max_index = index as f32;
    }
}
