//! Ownership bookkeeping for the device buffer ring

use crate::error::CaptureError;

/// Who holds a mapped device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Mapped but not handed to the driver
    Free,
    /// Owned by the driver, waiting to be filled
    Queued,
    /// Handed back filled, being converted
    Dequeued,
}

/// Fixed-size arena of buffer slots addressed by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRing {
    slots: Vec<SlotState>,
}

impl BufferRing {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![SlotState::Free; count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).copied()
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|&&s| s == state).count()
    }

    /// Indices currently in `state`, lowest first.
    pub fn indices(&self, state: SlotState) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == state)
            .map(|(i, _)| i)
            .collect()
    }

    /// Free or Dequeued -> Queued
    pub fn mark_queued(&mut self, index: usize) -> Result<(), CaptureError> {
        self.transition(index, SlotState::Queued, |from| {
            matches!(from, SlotState::Free | SlotState::Dequeued)
        })
    }

    /// Queued -> Dequeued
    pub fn mark_dequeued(&mut self, index: usize) -> Result<(), CaptureError> {
        self.transition(index, SlotState::Dequeued, |from| from == SlotState::Queued)
    }

    /// Every slot back to Free, after the driver has dropped its queue.
    pub fn reset(&mut self) {
        self.slots.fill(SlotState::Free);
    }

    fn transition(
        &mut self,
        index: usize,
        to: SlotState,
        allowed: impl Fn(SlotState) -> bool,
    ) -> Result<(), CaptureError> {
        let slot = self.slots.get_mut(index).ok_or(CaptureError::SlotTransition {
            index,
            from: SlotState::Free,
            to,
        })?;
        if !allowed(*slot) {
            return Err(CaptureError::SlotTransition {
                index,
                from: *slot,
                to,
            });
        }
        *slot = to;
        Ok(())
    }
}
