//! One open document with its annotations, undo history and gesture state

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, FileKey, ViewportAnnotation,
};
use crate::compositor::{self, ExportJob, ExportReport};
use crate::config::{AnnotatorConfig, ToolConfig};
use crate::error::{AnnotatorError, Result};
use crate::history::History;
use crate::interaction::{InteractionEvent, InteractionMachine, InteractionOutcome};
use crate::persistence::{MemoryBackend, PersistenceBackend};
use crate::store::AnnotationStore;
use serde::Serialize;

/// Compact listing entry for annotation side panels
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSummary {
    pub id: AnnotationId,
    pub kind: AnnotationKind,
    pub page: u32,
    pub text: String,
    pub edited_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Annotation> for AnnotationSummary {
    fn from(a: &Annotation) -> Self {
        Self {
            id: a.id(),
            kind: a.kind(),
            page: a.page(),
            text: a.text().to_string(),
            edited_at: a.edited_at(),
        }
    }
}

#[derive(Debug)]
struct LoadedDocument {
    bytes: Vec<u8>,
    page_count: u32,
}

#[derive(Debug)]
pub struct AnnotationSession {
    config: AnnotatorConfig,
    store: AnnotationStore,
    history: History,
    machine: InteractionMachine,
    document: Option<LoadedDocument>,
}

impl Default for AnnotationSession {
    fn default() -> Self {
        Self::new(AnnotatorConfig::default(), Box::new(MemoryBackend::new()))
    }
}

impl AnnotationSession {
    pub fn new(config: AnnotatorConfig, backend: Box<dyn PersistenceBackend>) -> Self {
        let store = AnnotationStore::new(backend, config.persistence.storage_key.clone());
        let history = History::new(store.snapshot(), config.history.limit);
        Self {
            config,
            store,
            history,
            machine: InteractionMachine::new(),
            document: None,
        }
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// Validate and adopt a document, switching to its annotation partition.
    /// On failure the previous document and annotations stay in place.
    pub fn open_document(&mut self, bytes: Vec<u8>, file: FileKey) -> Result<u32> {
        let doc = compositor::load_document(&bytes)?;
        let page_count = doc.get_pages().len() as u32;

        self.machine = InteractionMachine::new();
        self.store.open_file(file);
        self.history.reset(self.store.snapshot());
        self.document = Some(LoadedDocument { bytes, page_count });

        tracing::info!(
            "Opened {} ({} pages, {} annotations)",
            self.store.file(),
            page_count,
            self.store.len()
        );
        Ok(page_count)
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn page_count(&self) -> Option<u32> {
        self.document.as_ref().map(|d| d.page_count)
    }

    pub fn file(&self) -> &FileKey {
        self.store.file()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn handle(&mut self, tool: &ToolConfig, event: InteractionEvent) -> InteractionOutcome {
        let outcome = self.machine.handle(&mut self.store, tool, event);
        self.record_if_changed();
        outcome
    }

    pub fn update_comment(&mut self, id: AnnotationId, text: impl Into<String>) -> bool {
        let updated = self.store.update(id, AnnotationPatch::text(text));
        self.record_if_changed();
        updated
    }

    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        let updated = self.store.update(id, patch);
        self.record_if_changed();
        updated
    }

    pub fn delete(&mut self, id: AnnotationId) -> bool {
        let deleted = self.store.delete(id);
        self.record_if_changed();
        deleted
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        let set = snapshot.annotations().clone();
        self.store.restore(set);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        let set = snapshot.annotations().clone();
        self.store.restore(set);
        true
    }

    pub fn annotations_for_page(&self, page: u32, zoom_factor: f64) -> Vec<ViewportAnnotation> {
        self.store.render_for_page(page, zoom_factor)
    }

    pub fn annotations(&self) -> Vec<AnnotationSummary> {
        self.store
            .all()
            .into_iter()
            .map(AnnotationSummary::from)
            .collect()
    }

    /// Owned export input; later edits to the session do not affect it
    pub fn export_job(&self) -> Result<ExportJob> {
        let document = self.document.as_ref().ok_or(AnnotatorError::NoDocument)?;
        Ok(ExportJob {
            source: document.bytes.clone(),
            annotations: self.store.all_grouped_by_page(),
            config: self.config.export.clone(),
        })
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        self.export_with_report().map(|(bytes, _)| bytes)
    }

    pub fn export_with_report(&self) -> Result<(Vec<u8>, ExportReport)> {
        self.export_job()?.run()
    }

    fn record_if_changed(&mut self) {
        if self.store.take_changed() {
            self.history.record(self.store.snapshot());
        }
    }
}
