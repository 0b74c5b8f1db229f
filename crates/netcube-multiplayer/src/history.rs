//! Move history: a fixed-capacity ring buffer and the dense/important pair.
//!
//! The locally controlled pawn records every simulated tick into the dense
//! buffer. Ticks whose input differs from the previous one also go into the
//! sparse "important" buffer. Reconciliation walks the dense buffer from the
//! oldest entry and rewrites states in place, so the buffer exposes raw
//! storage indices as well as ordered iteration.

use std::ops::{Index, IndexMut};

use netcube_config::HistoryConfig;

use crate::state::Move;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`MoveRingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The buffer holds no moves.
    #[error("move history is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// MoveRingBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity FIFO of [`Move`]s.
///
/// Storage has one slot more than the capacity so that `head == tail` always
/// means empty. Adding to a full buffer evicts the oldest move.
#[derive(Debug, Clone)]
pub struct MoveRingBuffer {
    slots: Vec<Move>,
    /// Next slot to write.
    head: usize,
    /// Oldest live slot.
    tail: usize,
}

impl MoveRingBuffer {
    /// Creates an empty buffer holding at most `capacity` moves.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Move::default(); capacity + 1],
            head: 0,
            tail: 0,
        }
    }

    /// Reinitialises the buffer, empty, with a new capacity.
    pub fn resize(&mut self, capacity: usize) {
        self.slots.clear();
        self.slots.resize(capacity + 1, Move::default());
        self.head = 0;
        self.tail = 0;
    }

    /// Drops every move, keeping the capacity.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Appends `mv` as the newest move, evicting the oldest when full.
    pub fn add(&mut self, mv: Move) {
        self.slots[self.head] = mv;
        self.head = self.next(self.head);
        if self.head == self.tail {
            self.tail = self.next(self.tail);
        }
    }

    /// Removes and returns the oldest move.
    pub fn remove(&mut self) -> Result<Move, HistoryError> {
        if self.is_empty() {
            return Err(HistoryError::Empty);
        }
        let mv = self.slots[self.tail];
        self.tail = self.next(self.tail);
        Ok(mv)
    }

    /// Oldest move, if any.
    pub fn oldest(&self) -> Option<&Move> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.tail])
        }
    }

    /// Newest move, if any.
    pub fn newest(&self) -> Option<&Move> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.previous(self.head)])
        }
    }

    /// Storage index after `index`, wrapping around.
    pub fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next >= self.slots.len() { 0 } else { next }
    }

    /// Storage index before `index`, wrapping around.
    pub fn previous(&self, index: usize) -> usize {
        if index == 0 {
            self.slots.len() - 1
        } else {
            index - 1
        }
    }

    /// Storage index the next [`add`](Self::add) writes to.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Storage index of the oldest move.
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Number of live moves.
    pub fn len(&self) -> usize {
        (self.head + self.slots.len() - self.tail) % self.slots.len()
    }

    /// Maximum number of live moves.
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// `true` when no moves are stored.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// `true` when the next add evicts.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Live moves, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Move> {
        let (older, newer) = self.live_slices();
        older.iter().chain(newer.iter())
    }

    /// Live moves, oldest first, mutably.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Move> {
        if self.tail <= self.head {
            let (live, rest) = self.slots[self.tail..self.head].split_at_mut(self.head - self.tail);
            live.iter_mut().chain(rest.iter_mut())
        } else {
            let (front, back) = self.slots.split_at_mut(self.tail);
            back.iter_mut().chain(front[..self.head].iter_mut())
        }
    }

    fn live_slices(&self) -> (&[Move], &[Move]) {
        if self.tail <= self.head {
            (&self.slots[self.tail..self.head], &[])
        } else {
            (&self.slots[self.tail..], &self.slots[..self.head])
        }
    }
}

impl Index<usize> for MoveRingBuffer {
    type Output = Move;

    /// Raw storage access. Panics when `index` is outside storage.
    fn index(&self, index: usize) -> &Move {
        &self.slots[index]
    }
}

impl IndexMut<usize> for MoveRingBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Move {
        &mut self.slots[index]
    }
}

// ---------------------------------------------------------------------------
// MoveHistory
// ---------------------------------------------------------------------------

/// Dense per-tick history plus the sparse buffer of input changes.
#[derive(Debug, Clone)]
pub struct MoveHistory {
    dense: MoveRingBuffer,
    important: MoveRingBuffer,
    use_important_moves: bool,
}

impl MoveHistory {
    /// Both buffers with the same capacity.
    pub fn new(capacity: usize, use_important_moves: bool) -> Self {
        Self {
            dense: MoveRingBuffer::new(capacity),
            important: MoveRingBuffer::new(capacity),
            use_important_moves,
        }
    }

    /// History sized from config.
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.capacity, config.use_important_moves)
    }

    /// Records `mv`. Returns whether it counted as important.
    ///
    /// A move is important when it is the first one or its input differs
    /// from the newest dense move.
    pub fn record(&mut self, mv: Move) -> bool {
        let important = self
            .dense
            .newest()
            .is_none_or(|previous| previous.input != mv.input);
        if important && self.use_important_moves {
            self.important.add(mv);
        }
        self.dense.add(mv);
        important
    }

    /// Drops every move older than `timestamp_ms` from both buffers.
    /// Returns how many dense moves were evicted.
    pub fn evict_older_than(&mut self, timestamp_ms: i32) -> usize {
        while self
            .important
            .oldest()
            .is_some_and(|mv| mv.timestamp_ms < timestamp_ms)
        {
            let _ = self.important.remove();
        }

        let mut evicted = 0;
        while self
            .dense
            .oldest()
            .is_some_and(|mv| mv.timestamp_ms < timestamp_ms)
        {
            let _ = self.dense.remove();
            evicted += 1;
        }
        evicted
    }

    /// Copies recomputed dense states onto matching important moves
    /// (same timestamp and input).
    pub fn refresh_important(&mut self) {
        let dense = &self.dense;
        for important in self.important.iter_mut() {
            if let Some(replayed) = dense.iter().find(|mv| {
                mv.timestamp_ms == important.timestamp_ms && mv.input == important.input
            }) {
                important.state = replayed.state;
            }
        }
    }

    /// Empties both buffers.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.important.clear();
    }

    /// Every recorded tick.
    pub fn dense(&self) -> &MoveRingBuffer {
        &self.dense
    }

    /// Mutable dense buffer, for replay.
    pub fn dense_mut(&mut self) -> &mut MoveRingBuffer {
        &mut self.dense
    }

    /// Moves where the input changed.
    pub fn important(&self) -> &MoveRingBuffer {
        &self.important
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
