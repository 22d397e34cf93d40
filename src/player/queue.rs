use std::collections::VecDeque;

use super::track::TrackRef;

/// FIFO of pending tracks plus the slot holding the last started track.
///
/// Only validated [`TrackRef`]s can be enqueued, so the queue itself never
/// rejects anything. It is not synchronised; the owning controller is.
#[derive(Debug, Default)]
pub struct TrackQueue {
    pending: VecDeque<TrackRef>,
    current: Option<TrackRef>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, track: TrackRef) {
        self.pending.push_back(track);
    }

    /// `None` when the queue is empty.
    pub fn dequeue(&mut self) -> Option<TrackRef> {
        self.pending.pop_front()
    }

    pub fn peek(&self) -> Option<&TrackRef> {
        self.pending.front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every pending track. The current slot is left alone.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRef> {
        self.pending.iter()
    }

    pub fn current(&self) -> Option<&TrackRef> {
        self.current.as_ref()
    }

    /// Records `track` as started. Callers pass tracks they already took out
    /// of the pending sequence.
    pub fn set_current(&mut self, track: TrackRef) {
        self.current = Some(track);
    }
}
