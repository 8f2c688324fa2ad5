//! Linear undo/redo over full annotation snapshots

use crate::annotation::AnnotationSet;
use std::collections::VecDeque;

/// Immutable copy of every annotation at one instant.
///
/// `stamp` only makes snapshots distinguishable; equality ignores it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    annotations: AnnotationSet,
    stamp: u64,
}

impl Snapshot {
    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.annotations == other.annotations
    }
}

#[derive(Debug, Clone)]
pub struct History {
    past: Vec<Snapshot>,
    present: Snapshot,
    future: VecDeque<Snapshot>,
    next_stamp: u64,
    limit: Option<usize>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(AnnotationSet::new(), None)
    }
}

impl History {
    /// Start a history whose present is `initial`; `limit` caps `past`
    pub fn new(initial: AnnotationSet, limit: Option<usize>) -> Self {
        Self {
            past: Vec::new(),
            present: Snapshot {
                annotations: initial,
                stamp: 0,
            },
            future: VecDeque::new(),
            next_stamp: 1,
            limit,
        }
    }

    /// Forget every snapshot and start again from `initial`
    pub fn reset(&mut self, initial: AnnotationSet) {
        *self = Self::new(initial, self.limit);
    }

    pub fn present(&self) -> &Snapshot {
        &self.present
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Record a new present. Returns false when it equals the current present.
    pub fn record(&mut self, annotations: AnnotationSet) -> bool {
        if annotations == self.present.annotations {
            return false;
        }
        let snapshot = Snapshot {
            annotations,
            stamp: self.next_stamp,
        };
        self.next_stamp += 1;
        let previous = std::mem::replace(&mut self.present, snapshot);
        self.past.push(previous);
        self.future.clear();
        if let Some(limit) = self.limit {
            if self.past.len() > limit {
                let excess = self.past.len() - limit;
                self.past.drain(..excess);
            }
        }
        true
    }

    /// Step back; returns the new present, or `None` when there is no past
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let previous = self.past.pop()?;
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        Some(&self.present)
    }

    /// Step forward; returns the new present, or `None` when there is no future
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.future.pop_front()?;
        let current = std::mem::replace(&mut self.present, next);
        self.past.push(current);
        Some(&self.present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, FileKey, Geometry, NewAnnotation};
    use crate::coords::Point;
    use crate::store::AnnotationStore;

    /// Build `n` distinct sets by growing a store one comment at a time
    fn sets(n: usize) -> Vec<AnnotationSet> {
        let mut store = AnnotationStore::in_memory();
        store.open_file(FileKey::url("memory"));
        (0..n)
            .map(|i| {
                store.create(NewAnnotation::new(
                    AnnotationKind::Comment,
                    1,
                    Geometry::Point {
                        at: Point::new(i as f64, i as f64),
                    },
                    1.0,
                ));
                store.snapshot()
            })
            .collect()
    }

    #[test]
    fn test_identical_record_is_ignored() {
        let s = sets(1);
        let mut history = History::default();
        assert!(history.record(s[0].clone()));
        assert!(!history.record(s[0].clone()));
        assert_eq!(history.past_len(), 1);
    }

    #[test]
    fn test_undo_redo_on_empty_are_noops() {
        let mut history = History::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_record_after_undo_clears_future() {
        let s = sets(3);
        let mut history = History::default();
        history.record(s[0].clone());
        history.record(s[1].clone());
        history.undo();
        assert!(history.can_redo());
        history.record(s[2].clone());
        assert!(!history.can_redo());
        assert_eq!(history.present().annotations(), &s[2]);
    }

    #[test]
    fn test_undo_moves_present_to_future_head() {
        let s = sets(2);
        let mut history = History::default();
        history.record(s[0].clone());
        history.record(s[1].clone());
        history.undo();
        history.undo();
        assert!(history.present().annotations().is_empty());
        assert_eq!(history.future_len(), 2);
        assert_eq!(history.redo().unwrap().annotations(), &s[0]);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let s = sets(5);
        let mut history = History::new(AnnotationSet::new(), Some(2));
        for set in &s {
            history.record(set.clone());
        }
        assert_eq!(history.past_len(), 2);
        history.undo();
        history.undo();
        assert_eq!(history.present().annotations(), &s[2]);
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_snapshot_equality_ignores_stamp() {
        let s = sets(1);
        let a = Snapshot {
            annotations: s[0].clone(),
            stamp: 1,
        };
        let b = Snapshot {
            annotations: s[0].clone(),
            stamp: 99,
        };
        assert_eq!(a, b);
    }
}
