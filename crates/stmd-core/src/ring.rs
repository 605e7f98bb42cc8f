//! Fixed-capacity circular store of recent frames.

use crate::Error;

/// Circular buffer with an explicit "current" slot.
///
/// Slots start out empty and are only ever filled; the temporal convolution
/// treats an empty slot as a zero contribution, so a freshly created filter
/// produces finite output from its very first frame.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    point: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer with `capacity` empty slots.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "ring buffer capacity must be positive".into(),
            ));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self { slots, point: 0 })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Advance the pointer, then store `value` at the new current slot.
    pub fn record_next(&mut self, value: T) {
        self.point = (self.point + 1) % self.slots.len();
        self.slots[self.point] = Some(value);
    }

    /// Overwrite the current slot without advancing. Used by iterative
    /// feedback loops that must not consume a history step.
    pub fn cover(&mut self, value: T) {
        self.slots[self.point] = Some(value);
    }

    /// Slot `offset` steps behind the current one; `None` if never written.
    pub fn read(&self, offset: usize) -> Option<&T> {
        let cap = self.slots.len();
        let idx = (self.point + cap - offset % cap) % cap;
        self.slots[idx].as_ref()
    }
}
