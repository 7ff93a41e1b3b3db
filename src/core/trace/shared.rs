// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-reader circular list.
//!
//! Several independent consumers (on-disk tracer, debug endpoint, in-memory
//! replay) drain a bounded history of recent records at different speeds.
//! Copying every record into N buffers or blocking on the slowest consumer
//! are both unacceptable, so readers are lagging cursors over the *same*
//! retained entries as the writer: an entry is duplicated only at the
//! moment a consumer takes it while someone else still needs it.
//!
//! Entries are kept in an arena ordered by a monotonically increasing
//! sequence number; each reader is a cursor into that sequence and each
//! entry is retained while the writer window or any live reader still
//! covers it; release happens when the last referent moves past, which
//! bounds memory without per-reader copies.
//!
//! Ring mode bounds the *writer window*: pushing at capacity reclaims the
//! oldest window entry even from lagging readers. [`RingReader::need_copy`]
//! reports when the entry a reader would take next is the one the next
//! overflow push reclaims and the reader is the last one pointing at it;
//! consumers that honor the signal snapshot the value before yielding back
//! to the producer.
//!
//! All operations go through one mutex; reader bookkeeping is not atomic
//! and every mutation must be serialized.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Entry<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Clone, Copy)]
struct ReaderState {
    /// Sequence number of the next entry this reader will take
    next_seq: u64,
    destroyed: bool,
}

#[derive(Debug)]
struct Inner<T> {
    /// Retained entries, ascending by `seq`; gaps appear where entries
    /// were reclaimed
    entries: VecDeque<Entry<T>>,
    /// Sequence number the next push receives
    next_seq: u64,
    /// Oldest sequence still inside the writer window
    window_start: u64,
    ring: bool,
    capacity: Option<usize>,
    saved_capacity: Vec<Option<usize>>,
    readers: Vec<ReaderState>,
}

impl<T> Inner<T> {
    fn window_len(&self) -> usize {
        (self.next_seq - self.window_start) as usize
    }

    /// Index of the first retained entry with `seq >= target`
    fn position_at_or_after(&self, target: u64) -> usize {
        self.entries.partition_point(|entry| entry.seq < target)
    }

    fn reader_needs(&self, reader_id: usize, seq: u64) -> bool {
        self.readers
            .iter()
            .enumerate()
            .any(|(id, reader)| id != reader_id && !reader.destroyed && reader.next_seq <= seq)
    }

    fn any_reader_needs(&self, seq: u64) -> bool {
        self.readers
            .iter()
            .any(|reader| !reader.destroyed && reader.next_seq <= seq)
    }

    /// Remove the oldest writer-window entry regardless of lagging
    /// readers; this is the reuse `need_copy` warns about
    fn reclaim_oldest(&mut self) -> Option<T> {
        let seq = self.window_start;
        self.window_start += 1;
        let idx = self.position_at_or_after(seq);
        match self.entries.get(idx) {
            Some(entry) if entry.seq == seq => self.entries.remove(idx).map(|e| e.value),
            _ => None,
        }
    }

    /// Drop retained entries no referent (writer window or live reader)
    /// covers any more
    fn prune(&mut self) {
        let min_reader = self
            .readers
            .iter()
            .filter(|reader| !reader.destroyed)
            .map(|reader| reader.next_seq)
            .min()
            .unwrap_or(self.next_seq);
        let min_needed = min_reader.min(self.window_start);
        while let Some(front) = self.entries.front() {
            if front.seq >= min_needed {
                break;
            }
            self.entries.pop_front();
        }
    }
}

/// Fixed-capacity (or unbounded) list shared between one writer and any
/// number of lagging readers
#[derive(Debug)]
pub struct MultiReaderRing<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for MultiReaderRing<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> MultiReaderRing<T> {
    /// # Panics
    ///
    /// Panics when `capacity` is `Some(0)`.
    pub fn new(capacity: Option<usize>) -> Self {
        if capacity == Some(0) {
            panic!("ring capacity must be at least 1");
        }
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::new(),
                next_seq: 0,
                window_start: 0,
                ring: false,
                capacity,
                saved_capacity: Vec::new(),
                readers: Vec::new(),
            })),
        }
    }

    /// Create a list with ring mode already enabled at `capacity`
    pub fn bounded(capacity: usize) -> Self {
        let ring = Self::new(Some(capacity));
        ring.enable_ring(None);
        ring
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().expect("ring lock poisoned")
    }

    /// Entries inside the writer window
    pub fn len(&self) -> usize {
        self.lock().window_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries retained for the writer window or lagging readers
    pub fn retained_len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn ring_enabled(&self) -> bool {
        self.lock().ring
    }

    pub fn capacity(&self) -> Option<usize> {
        self.lock().capacity
    }

    /// Append at the front. In ring mode at capacity the oldest window
    /// entry is reclaimed and returned, even when a lagging reader still
    /// pointed at it.
    pub fn push(&self, value: T) -> Option<T> {
        let mut inner = self.lock();
        let evicted = match inner.capacity {
            Some(cap) if inner.ring && inner.window_len() >= cap => inner.reclaim_oldest(),
            _ => None,
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(Entry { seq, value });
        evicted
    }

    /// Remove the oldest window entry. The value stays retained (cloned
    /// out) while a lagging reader still needs it.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        if inner.window_len() == 0 {
            return None;
        }
        let seq = inner.window_start;
        inner.window_start += 1;
        let idx = inner.position_at_or_after(seq);
        debug_assert!(matches!(inner.entries.get(idx), Some(entry) if entry.seq == seq));
        if inner.any_reader_needs(seq) {
            inner.entries.get(idx).map(|entry| entry.value.clone())
        } else {
            inner.entries.remove(idx).map(|entry| entry.value)
        }
    }

    /// Oldest window entry, without removing
    pub fn bpeak(&self) -> Option<T> {
        let inner = self.lock();
        if inner.window_len() == 0 {
            return None;
        }
        let idx = inner.position_at_or_after(inner.window_start);
        inner.entries.get(idx).map(|entry| entry.value.clone())
    }

    /// Newest entry, without removing
    pub fn fpeak(&self) -> Option<T> {
        let inner = self.lock();
        if inner.window_len() == 0 {
            return None;
        }
        inner.entries.back().map(|entry| entry.value.clone())
    }

    /// Switch to bounded mode; see [`super::ring::RingList::enable_ring`]
    /// for the no-op-when-enabled and capacity-restore contract, which is
    /// identical here.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is `Some(0)`, or when no capacity was given
    /// here or at construction.
    pub fn enable_ring(&self, capacity: Option<usize>) -> Vec<T> {
        let mut inner = self.lock();
        if inner.ring {
            return Vec::new();
        }
        if capacity == Some(0) {
            panic!("ring capacity must be at least 1");
        }
        let new_capacity = match capacity.or(inner.capacity) {
            Some(cap) => cap,
            None => panic!("enable_ring requires a capacity"),
        };
        let previous = inner.capacity;
        inner.saved_capacity.push(previous);
        inner.capacity = Some(new_capacity);
        inner.ring = true;

        let mut evicted = Vec::new();
        while inner.window_len() > new_capacity {
            if let Some(value) = inner.reclaim_oldest() {
                evicted.push(value);
            }
        }
        evicted
    }

    /// Revert to unbounded mode, optionally restoring the capacity active
    /// before the matching `enable_ring`
    pub fn disable_ring(&self, restore_previous_capacity: bool) {
        let mut inner = self.lock();
        if !inner.ring {
            return;
        }
        inner.ring = false;
        let previous = inner.saved_capacity.pop();
        if restore_previous_capacity {
            if let Some(previous) = previous {
                inner.capacity = previous;
            }
        }
    }

    /// Drop every entry. With `keep_readers` the reader handles stay
    /// valid and simply see no data; without it they are invalidated and
    /// any further use panics.
    pub fn erase(&self, keep_readers: bool) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.window_start = inner.next_seq;
        let next_seq = inner.next_seq;
        for reader in &mut inner.readers {
            if keep_readers {
                reader.next_seq = next_seq;
            } else {
                reader.destroyed = true;
            }
        }
    }

    /// Create a reader positioned at the current write position: it
    /// observes every value pushed after its creation, in push order,
    /// exactly once, at its own pace.
    pub fn reader(&self) -> RingReader<T> {
        let mut inner = self.lock();
        let id = inner.readers.len();
        let next_seq = inner.next_seq;
        inner.readers.push(ReaderState {
            next_seq,
            destroyed: false,
        });
        RingReader {
            inner: Arc::clone(&self.inner),
            id,
        }
    }
}

impl<T: Clone> Default for MultiReaderRing<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

/// An independent lagging cursor over a [`MultiReaderRing`]
#[derive(Debug)]
pub struct RingReader<T> {
    inner: Arc<Mutex<Inner<T>>>,
    id: usize,
}

impl<T: Clone> RingReader<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        let inner = self.inner.lock().expect("ring lock poisoned");
        if inner.readers[self.id].destroyed {
            panic!("reader has been destroyed");
        }
        inner
    }

    /// Take the next unread entry. The entry is handed over (moved) when
    /// this reader was its last referent, cloned otherwise.
    ///
    /// # Panics
    ///
    /// Panics when the reader has been destroyed (directly or via
    /// `erase(false)`).
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        let idx = inner.position_at_or_after(inner.readers[self.id].next_seq);
        let seq = inner.entries.get(idx)?.seq;
        inner.readers[self.id].next_seq = seq + 1;
        let shared = seq >= inner.window_start || inner.reader_needs(self.id, seq);
        if shared {
            inner.entries.get(idx).map(|entry| entry.value.clone())
        } else {
            inner.entries.remove(idx).map(|entry| entry.value)
        }
    }

    /// True when at least one unread entry is retained
    pub fn has_data(&self) -> bool {
        let inner = self.lock();
        let next_seq = inner.readers[self.id].next_seq;
        inner
            .entries
            .back()
            .map(|entry| entry.seq >= next_seq)
            .unwrap_or(false)
    }

    /// Unread entries currently retained for this reader
    pub fn lag(&self) -> usize {
        let inner = self.lock();
        let next_seq = inner.readers[self.id].next_seq;
        inner.entries.len() - inner.position_at_or_after(next_seq)
    }

    /// True when the entry this reader would take next is the one the
    /// next overflow push reclaims, and no other reader still points at
    /// it; snapshot the value now or it is gone.
    pub fn need_copy(&self) -> bool {
        let inner = self.lock();
        let at_capacity = match inner.capacity {
            Some(cap) => inner.ring && inner.window_len() >= cap,
            None => false,
        };
        if !at_capacity {
            return false;
        }
        let next_seq = inner.readers[self.id].next_seq;
        let idx = inner.position_at_or_after(next_seq);
        let points_at_oldest = matches!(
            inner.entries.get(idx),
            Some(entry) if entry.seq == inner.window_start
        );
        points_at_oldest && !inner.reader_needs(self.id, inner.window_start)
    }

    /// Oldest unread entry, without consuming it
    pub fn bpeak(&self) -> Option<T> {
        let inner = self.lock();
        let idx = inner.position_at_or_after(inner.readers[self.id].next_seq);
        inner.entries.get(idx).map(|entry| entry.value.clone())
    }

    /// Newest unread entry, without consuming it
    pub fn fpeak(&self) -> Option<T> {
        let inner = self.lock();
        let next_seq = inner.readers[self.id].next_seq;
        inner
            .entries
            .back()
            .filter(|entry| entry.seq >= next_seq)
            .map(|entry| entry.value.clone())
    }

    /// Release this reader's hold on the shared entries; anything only it
    /// was keeping alive is dropped
    pub fn destroy(self) {
        // Drop impl does the bookkeeping
    }
}

impl<T> Drop for RingReader<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.readers[self.id].destroyed = true;
            inner.prune();
        }
    }
}
