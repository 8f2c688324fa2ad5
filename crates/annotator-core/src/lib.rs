//! PDF annotation model and compositing
//!
//! Pointer geometry arrives in viewport pixels, is stored in page-normalized
//! units (zoom 100%), and is projected into PDF user space only when the
//! annotations are burned into an exported copy of the document.
//!
//! - [`session::AnnotationSession`]: the host-facing entry point
//! - [`compositor::export`]: stateless export from an owned snapshot

pub mod annotation;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod error;
pub mod history;
pub mod interaction;
pub mod persistence;
pub mod session;
pub mod store;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationSet, FileKey, Geometry,
    MediaPayload, NewAnnotation, Style, ViewportAnnotation,
};
pub use compositor::{export, export_with_report, ExportJob, ExportReport, SkippedAnnotation};
pub use config::{AnnotatorConfig, ExportConfig, HistoryConfig, PersistenceConfig, ToolConfig};
pub use coords::{PdfRect, Point, Rect};
pub use error::{AnnotatorError, Result};
pub use history::{History, Snapshot};
pub use interaction::{InteractionEvent, InteractionMachine, InteractionOutcome, TextSelection, Tool};
pub use persistence::{JsonDirBackend, MemoryBackend, PersistenceBackend, DEFAULT_STORAGE_KEY};
pub use session::{AnnotationSession, AnnotationSummary};
pub use store::AnnotationStore;

/// Parse PDF bytes and return the page count
pub fn page_count(bytes: &[u8]) -> Result<u32> {
    let doc = compositor::load_document(bytes)?;
    Ok(doc.get_pages().len() as u32)
}
