//! The authoritative collection of annotations for the open document

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationSet, FileKey,
    NewAnnotation, ViewportAnnotation,
};
use crate::persistence::{self, MemoryBackend, PersistenceBackend, DEFAULT_STORAGE_KEY};
use chrono::Utc;
use std::collections::BTreeMap;

pub struct AnnotationStore {
    file: FileKey,
    set: AnnotationSet,
    next_seq: u64,
    active: Option<AnnotationId>,
    changed: bool,
    backend: Box<dyn PersistenceBackend>,
    storage_key: String,
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("file", &self.file)
            .field("len", &self.set.len())
            .field("active", &self.active)
            .finish()
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AnnotationStore {
    pub fn new(backend: Box<dyn PersistenceBackend>, storage_key: impl Into<String>) -> Self {
        Self {
            file: FileKey::url(""),
            set: AnnotationSet::new(),
            next_seq: 0,
            active: None,
            changed: false,
            backend,
            storage_key: storage_key.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()), DEFAULT_STORAGE_KEY)
    }

    pub fn file(&self) -> &FileKey {
        &self.file
    }

    /// Switch to another document, dropping in-memory state and loading that
    /// document's persisted annotations. Does not mark the store changed.
    pub fn open_file(&mut self, file: FileKey) {
        let set = match persistence::load_file(self.backend.as_ref(), &self.storage_key, &file) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Could not load annotations for {}: {}", file, e);
                AnnotationSet::new()
            }
        };
        tracing::debug!("Opened {} with {} annotations", file, set.len());
        self.file = file;
        self.next_seq = set.max_seq().map_or(0, |s| s + 1);
        self.set = set;
        self.active = None;
        self.changed = false;
    }

    pub fn create(&mut self, new: NewAnnotation) -> Annotation {
        let annotation = Annotation::create(new, self.file.clone(), self.next_seq, Utc::now());
        self.next_seq += 1;
        self.set
            .list_mut(annotation.kind())
            .push(annotation.clone());
        tracing::debug!(
            "Created {:?} {} on page {}",
            annotation.kind(),
            annotation.id(),
            annotation.page()
        );
        self.commit();
        annotation
    }

    /// Merge fields into an existing annotation. Unknown ids are ignored:
    /// UI actions can race with a delete.
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        match self.set.find_mut(id) {
            Some(annotation) => {
                annotation.apply(patch, Utc::now());
                self.commit();
                true
            }
            None => {
                tracing::debug!("Ignoring update for unknown annotation {}", id);
                false
            }
        }
    }

    pub fn delete(&mut self, id: AnnotationId) -> bool {
        if self.set.remove(id).is_none() {
            tracing::debug!("Ignoring delete for unknown annotation {}", id);
            return false;
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.commit();
        true
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.set.find(id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn list(&self, kind: AnnotationKind) -> &[Annotation] {
        self.set.list(kind)
    }

    /// All annotations in insertion order
    pub fn all(&self) -> Vec<&Annotation> {
        self.set.ordered()
    }

    /// Annotations on one page in insertion order (later draws on top)
    pub fn all_for_page(&self, page: u32) -> Vec<&Annotation> {
        self.set
            .ordered()
            .into_iter()
            .filter(|a| a.page() == page)
            .collect()
    }

    /// Owned copy of every annotation grouped by page, for export
    pub fn all_grouped_by_page(&self) -> BTreeMap<u32, Vec<Annotation>> {
        let mut grouped: BTreeMap<u32, Vec<Annotation>> = BTreeMap::new();
        for annotation in self.set.ordered() {
            grouped
                .entry(annotation.page())
                .or_default()
                .push(annotation.clone());
        }
        grouped
    }

    /// Page annotations projected to the viewport at the render zoom
    pub fn render_for_page(&self, page: u32, zoom_factor: f64) -> Vec<ViewportAnnotation> {
        self.all_for_page(page)
            .into_iter()
            .map(|a| ViewportAnnotation::project(a, zoom_factor))
            .collect()
    }

    pub fn active(&self) -> Option<AnnotationId> {
        self.active
    }

    /// Mark an annotation as being edited; ignored for unknown ids
    pub fn set_active(&mut self, id: AnnotationId) -> bool {
        if self.set.find(id).is_some() {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn clear_active(&mut self) -> Option<AnnotationId> {
        self.active.take()
    }

    pub fn snapshot(&self) -> AnnotationSet {
        self.set.clone()
    }

    /// Replace the contents without marking the store changed, so that
    /// applying an undo/redo result is never recorded as a new action.
    pub fn restore(&mut self, set: AnnotationSet) {
        self.next_seq = self.next_seq.max(set.max_seq().map_or(0, |s| s + 1));
        self.set = set;
        if let Some(id) = self.active {
            if self.set.find(id).is_none() {
                self.active = None;
            }
        }
        self.persist();
    }

    /// Report and reset whether a recording mutation happened
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn commit(&mut self) {
        self.changed = true;
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = persistence::save_file(
            self.backend.as_mut(),
            &self.storage_key,
            &self.file,
            &self.set,
        ) {
            tracing::warn!("Failed to persist annotations for {}: {}", self.file, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Geometry;
    use crate::coords::{Point, Rect};
    use crate::error::{AnnotatorError, Result};

    fn comment_at(page: u32, x: f64, y: f64) -> NewAnnotation {
        NewAnnotation::new(
            AnnotationKind::Comment,
            page,
            Geometry::Point {
                at: Point::new(x, y),
            },
            1.0,
        )
    }

    fn highlight(page: u32) -> NewAnnotation {
        NewAnnotation::new(
            AnnotationKind::Highlight,
            page,
            Geometry::Rect {
                rect: Rect::new(10.0, 10.0, 100.0, 12.0),
            },
            1.0,
        )
        .with_text("selected")
    }

    struct FailingBackend;

    impl PersistenceBackend for FailingBackend {
        fn load(&self, _key: &str) -> Result<Option<String>> {
            Err(AnnotatorError::PersistenceError("unavailable".to_string()))
        }

        fn save(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(AnnotatorError::PersistenceError("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let mut store = AnnotationStore::in_memory();
        let a = store.create(comment_at(1, 0.0, 0.0));
        let b = store.create(comment_at(1, 0.0, 0.0));
        assert_ne!(a.id(), b.id());
        assert_eq!(store.len(), 2);
        assert!(b.seq() > a.seq());
    }

    #[test]
    fn test_all_for_page_keeps_insertion_order_across_kinds() {
        let mut store = AnnotationStore::in_memory();
        let first = store.create(highlight(1));
        let second = store.create(comment_at(1, 5.0, 5.0));
        let third = store.create(highlight(1));
        store.create(comment_at(2, 5.0, 5.0));

        let ids: Vec<AnnotationId> = store.all_for_page(1).iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut store = AnnotationStore::in_memory();
        store.create(comment_at(1, 0.0, 0.0));
        store.take_changed();
        assert!(!store.update(AnnotationId::new(), AnnotationPatch::text("x")));
        assert!(!store.take_changed());
    }

    #[test]
    fn test_update_merges_text() {
        let mut store = AnnotationStore::in_memory();
        let a = store.create(comment_at(1, 0.0, 0.0));
        assert!(store.update(a.id(), AnnotationPatch::text("Hello")));
        assert_eq!(store.get(a.id()).unwrap().text(), "Hello");
    }

    #[test]
    fn test_delete_clears_active() {
        let mut store = AnnotationStore::in_memory();
        let a = store.create(comment_at(1, 0.0, 0.0));
        assert!(store.set_active(a.id()));
        assert!(store.delete(a.id()));
        assert_eq!(store.active(), None);
        assert!(!store.delete(a.id()));
    }

    #[test]
    fn test_restore_does_not_mark_changed() {
        let mut store = AnnotationStore::in_memory();
        store.create(comment_at(1, 0.0, 0.0));
        assert!(store.take_changed());
        let empty = AnnotationSet::new();
        store.restore(empty);
        assert!(!store.take_changed());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_drops_stale_active() {
        let mut store = AnnotationStore::in_memory();
        let a = store.create(comment_at(1, 0.0, 0.0));
        store.set_active(a.id());
        store.restore(AnnotationSet::new());
        assert_eq!(store.active(), None);
    }

    #[test]
    fn test_grouped_by_page_is_a_copy() {
        let mut store = AnnotationStore::in_memory();
        store.create(highlight(1));
        store.create(highlight(3));
        let grouped = store.all_grouped_by_page();
        store.create(highlight(1));
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(grouped[&1].len(), 1);
    }

    #[test]
    fn test_files_are_partitioned() {
        let mut store = AnnotationStore::in_memory();
        store.open_file(FileKey::local("a.pdf", 1));
        store.create(highlight(1));
        store.open_file(FileKey::local("b.pdf", 1));
        assert!(store.is_empty());
        store.create(comment_at(1, 0.0, 0.0));
        store.open_file(FileKey::local("a.pdf", 1));
        assert_eq!(store.len(), 1);
        assert_eq!(store.list(AnnotationKind::Highlight).len(), 1);
    }

    #[test]
    fn test_reopened_file_continues_sequence() {
        let mut store = AnnotationStore::in_memory();
        store.open_file(FileKey::local("a.pdf", 1));
        let a = store.create(highlight(1));
        store.open_file(FileKey::local("b.pdf", 1));
        store.open_file(FileKey::local("a.pdf", 1));
        let b = store.create(highlight(1));
        assert!(b.seq() > a.seq());
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let mut store = AnnotationStore::new(Box::new(FailingBackend), DEFAULT_STORAGE_KEY);
        store.open_file(FileKey::url("https://example.test/a.pdf"));
        let a = store.create(comment_at(1, 0.0, 0.0));
        assert!(store.update(a.id(), AnnotationPatch::text("still works")));
        assert_eq!(store.get(a.id()).unwrap().text(), "still works");
    }

    #[test]
    fn test_render_for_page_applies_zoom() {
        let mut store = AnnotationStore::in_memory();
        store.create(NewAnnotation::new(
            AnnotationKind::Highlight,
            1,
            Geometry::Rect {
                rect: Rect::new(120.0, 80.0, 30.0, 15.0),
            },
            1.5,
        ));
        let at_100 = store.render_for_page(1, 1.0);
        let rect = at_100[0].rect.unwrap();
        assert!((rect.x - 80.0).abs() < 1e-9);
        assert!((rect.y - 53.333).abs() < 0.001);
        let at_200 = store.render_for_page(1, 2.0);
        assert!((at_200[0].rect.unwrap().x - 160.0).abs() < 1e-9);
    }
}
