//! Per-field ring of open snapshot readers.

use std::sync::Arc;

use drift_core::{BackingStore, LoadError, SnapshotReader};

/// The snapshots of one field that are currently resident.
///
/// Slot `i` holds the reader for global time index `start + i`; slots are
/// always contiguous. Moving the window shifts surviving slots by the
/// signed distance between the old and new start, closes the readers that
/// fall out, and opens readers only for the entering time indices. The
/// same shift handles both directions of travel.
pub struct TimeWindowBuffer {
    slots: Vec<Option<Arc<dyn SnapshotReader>>>,
    start: Option<usize>,
}

impl TimeWindowBuffer {
    /// An empty buffer of `window_size` slots.
    pub fn new(window_size: usize) -> Self {
        Self {
            slots: (0..window_size).map(|_| None).collect(),
            start: None,
        }
    }

    /// Number of slots.
    pub fn window_size(&self) -> usize {
        self.slots.len()
    }

    /// First global time index, `None` before the first load.
    pub fn start(&self) -> Option<usize> {
        self.start
    }

    /// Global time indices of the slots that hold a reader.
    pub fn loaded_time_indices(&self) -> Vec<usize> {
        let Some(start) = self.start else {
            return Vec::new();
        };
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| start + i)
            .collect()
    }

    /// Whether `time_index` lies inside the window.
    pub fn covers(&self, time_index: usize) -> bool {
        self.start
            .is_some_and(|s| time_index >= s && time_index < s + self.slots.len())
    }

    /// Reader for `time_index`, if it is resident.
    pub fn reader(&self, time_index: usize) -> Option<Arc<dyn SnapshotReader>> {
        let start = self.start?;
        let slot = time_index.checked_sub(start)?;
        self.slots.get(slot)?.as_ref().map(Arc::clone)
    }

    /// Move the window to `new_start`, returning the time indices that were
    /// opened.
    ///
    /// If opening fails the window keeps the new start with the failed slot
    /// empty; [`reader`](Self::reader) reports it as missing.
    pub fn sync_to(
        &mut self,
        new_start: usize,
        store: &dyn BackingStore,
    ) -> Result<Vec<usize>, LoadError> {
        if self.start == Some(new_start) && self.slots.iter().all(Option::is_some) {
            return Ok(Vec::new());
        }
        if let Some(old) = self.start {
            self.shift(new_start as isize - old as isize);
        }
        self.start = Some(new_start);

        let mut opened = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                let time_index = new_start + i;
                *slot = Some(store.open_time_slice(time_index)?);
                opened.push(time_index);
            }
        }
        Ok(opened)
    }

    /// Shift slots by `by` positions towards lower (positive) or higher
    /// (negative) slot numbers, closing the readers pushed out.
    fn shift(&mut self, by: isize) {
        let w = self.slots.len();
        let n = by.unsigned_abs().min(w);
        if n == 0 {
            return;
        }
        let leaving = if by > 0 { 0..n } else { w - n..w };
        for slot in &mut self.slots[leaving] {
            if let Some(reader) = slot.take() {
                reader.close();
            }
        }
        if by > 0 {
            self.slots.rotate_left(n);
        } else {
            self.slots.rotate_right(n);
        }
    }

    /// Close every open reader and forget the window position.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            if let Some(reader) = slot.take() {
                reader.close();
            }
        }
        self.start = None;
    }
}

impl std::fmt::Debug for TimeWindowBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowBuffer")
            .field("start", &self.start)
            .field("loaded", &self.loaded_time_indices())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;
    use proptest::prelude::*;

    #[test]
    fn initial_sync_opens_every_slot() {
        let store = CountingStore::new(5);
        let mut buf = TimeWindowBuffer::new(3);
        assert_eq!(buf.sync_to(1, &store).unwrap(), vec![1, 2, 3]);
        assert_eq!(buf.loaded_time_indices(), vec![1, 2, 3]);
        assert_eq!(store.opens(), 3);
    }

    #[test]
    fn forward_slide_opens_one_and_closes_one() {
        let store = CountingStore::new(5);
        let mut buf = TimeWindowBuffer::new(3);
        buf.sync_to(0, &store).unwrap();
        assert_eq!(buf.sync_to(1, &store).unwrap(), vec![3]);
        assert_eq!(buf.loaded_time_indices(), vec![1, 2, 3]);
        assert_eq!(store.closed(), vec![0]);
        assert_eq!(buf.reader(1).unwrap().time_index(), 1);
        assert_eq!(buf.reader(3).unwrap().time_index(), 3);
    }

    #[test]
    fn backward_slide_mirrors_forward() {
        let store = CountingStore::new(5);
        let mut buf = TimeWindowBuffer::new(3);
        buf.sync_to(2, &store).unwrap();
        assert_eq!(buf.sync_to(1, &store).unwrap(), vec![1]);
        assert_eq!(buf.loaded_time_indices(), vec![1, 2, 3]);
        assert_eq!(store.closed(), vec![4]);
        assert_eq!(buf.reader(2).unwrap().time_index(), 2);
    }

    #[test]
    fn long_jump_reopens_everything() {
        let store = CountingStore::new(10);
        let mut buf = TimeWindowBuffer::new(2);
        buf.sync_to(0, &store).unwrap();
        assert_eq!(buf.sync_to(5, &store).unwrap(), vec![5, 6]);
        assert_eq!(store.closed(), vec![0, 1]);
    }

    #[test]
    fn same_start_is_a_no_op() {
        let store = CountingStore::new(3);
        let mut buf = TimeWindowBuffer::new(2);
        buf.sync_to(0, &store).unwrap();
        assert!(buf.sync_to(0, &store).unwrap().is_empty());
        assert_eq!(store.opens(), 2);
    }

    #[test]
    fn failed_open_leaves_slot_empty() {
        let store = CountingStore::new(2);
        let mut buf = TimeWindowBuffer::new(3);
        let err = buf.sync_to(0, &store).unwrap_err();
        assert_eq!(err, LoadError::MissingSnapshot { time_index: 2 });
        assert!(buf.reader(2).is_none());
        assert!(buf.reader(1).is_some());
    }

    proptest! {
        #[test]
        fn slots_match_time_indices(starts in prop::collection::vec(0usize..8, 1..10)) {
            let store = CountingStore::new(10);
            let mut buf = TimeWindowBuffer::new(3);
            for &s in &starts {
                buf.sync_to(s, &store).unwrap();
                prop_assert_eq!(buf.loaded_time_indices(), vec![s, s + 1, s + 2]);
                for t in s..s + 3 {
                    prop_assert_eq!(buf.reader(t).unwrap().time_index(), t);
                }
            }
            prop_assert_eq!(store.opens() - store.closed().len(), 3);
        }
    }
}
