//! JavaScript-facing annotation session

use crate::local_storage::LocalStorageBackend;
use annotator_core::{
    AnnotationId, AnnotationSession, AnnotatorConfig, FileKey, InteractionEvent, MemoryBackend,
    PersistenceBackend, ToolConfig,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_error)
}

/// `File.lastModified` arrives as a JS number of milliseconds
fn local_file_key(name: &str, last_modified: f64) -> FileKey {
    let millis = if last_modified.is_finite() {
        last_modified.trunc() as i64
    } else {
        0
    };
    FileKey::local(name, millis)
}

fn parse_id(id: &str) -> Result<AnnotationId, String> {
    id.trim()
        .parse()
        .map_err(|e| format!("Invalid annotation id '{}': {}", id, e))
}

fn parse_config(toml: Option<String>) -> Result<AnnotatorConfig, String> {
    match toml {
        Some(s) if !s.trim().is_empty() => {
            AnnotatorConfig::from_toml_str(&s).map_err(|e| e.to_string())
        }
        _ => Ok(AnnotatorConfig::default()),
    }
}

fn default_backend() -> Box<dyn PersistenceBackend> {
    match LocalStorageBackend::from_window() {
        Some(backend) => Box::new(backend),
        None => {
            web_sys::console::warn_1(
                &"localStorage unavailable, annotations will not survive a reload".into(),
            );
            Box::new(MemoryBackend::new())
        }
    }
}

/// Annotation session for one loaded PDF
#[wasm_bindgen]
pub struct AnnotatorSession {
    inner: AnnotationSession,
}

impl AnnotatorSession {
    fn open(bytes: &[u8], file: FileKey, config: Option<String>) -> Result<Self, JsValue> {
        let config = parse_config(config).map_err(|e| JsValue::from_str(&e))?;
        let mut inner = AnnotationSession::new(config, default_backend());
        inner
            .open_document(bytes.to_vec(), file)
            .map_err(|e| JsValue::from_str(&format!("Parse error: {}", e)))?;
        Ok(Self { inner })
    }
}

#[wasm_bindgen]
impl AnnotatorSession {
    /// Open a local file; annotations are keyed by name and modification time
    #[wasm_bindgen(constructor)]
    pub fn new(
        name: &str,
        last_modified: f64,
        bytes: &[u8],
        config_toml: Option<String>,
    ) -> Result<AnnotatorSession, JsValue> {
        Self::open(bytes, local_file_key(name, last_modified), config_toml)
    }

    /// Open a fetched document; annotations are keyed by its URL
    #[wasm_bindgen(js_name = fromUrl)]
    pub fn from_url(
        url: &str,
        bytes: &[u8],
        config_toml: Option<String>,
    ) -> Result<AnnotatorSession, JsValue> {
        Self::open(bytes, FileKey::url(url), config_toml)
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.inner.page_count().unwrap_or(0)
    }

    #[wasm_bindgen(getter, js_name = fileKey)]
    pub fn file_key(&self) -> String {
        self.inner.file().to_string()
    }

    /// Feed one pointer/selection/comment event; returns the outcome object
    #[wasm_bindgen(js_name = handleEvent)]
    pub fn handle_event(&mut self, tool: JsValue, event: JsValue) -> Result<JsValue, JsValue> {
        let tool: ToolConfig = serde_wasm_bindgen::from_value(tool)
            .map_err(|e| JsValue::from_str(&format!("Invalid tool config: {}", e)))?;
        let event: InteractionEvent = serde_wasm_bindgen::from_value(event)
            .map_err(|e| JsValue::from_str(&format!("Invalid event: {}", e)))?;
        let outcome = self.inner.handle(&tool, event);
        to_js(&outcome)
    }

    /// Annotations on `page` projected to the viewport at `zoom_factor`
    #[wasm_bindgen(js_name = annotationsForPage)]
    pub fn annotations_for_page(&self, page: u32, zoom_factor: f64) -> Result<JsValue, JsValue> {
        to_js(&self.inner.annotations_for_page(page, zoom_factor))
    }

    /// Every annotation of the document, in creation order
    #[wasm_bindgen(js_name = annotations)]
    pub fn annotations(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.annotations())
    }

    #[wasm_bindgen(js_name = updateComment)]
    pub fn update_comment(&mut self, id: &str, text: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(|e| JsValue::from_str(&e))?;
        Ok(self.inner.update_comment(id, text))
    }

    #[wasm_bindgen(js_name = deleteAnnotation)]
    pub fn delete_annotation(&mut self, id: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(|e| JsValue::from_str(&e))?;
        Ok(self.inner.delete(id))
    }

    pub fn undo(&mut self) -> bool {
        self.inner.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.inner.redo()
    }

    #[wasm_bindgen(getter, js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(getter, js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    /// Burn every annotation into a copy of the document
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&self) -> Result<js_sys::Uint8Array, JsValue> {
        let (bytes, report) = self.inner.export_with_report().map_err(js_error)?;
        if !report.skipped.is_empty() {
            web_sys::console::warn_1(
                &format!(
                    "{} annotation(s) could not be exported",
                    report.skipped.len()
                )
                .into(),
            );
        }
        let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
        array.copy_from(&bytes);
        Ok(array)
    }

    /// The stored annotation set as JSON, in the persisted layout
    #[wasm_bindgen(js_name = annotationsJson)]
    pub fn annotations_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.store().snapshot()).map_err(js_error)
    }

    /// Export summary (drawn and skipped annotations) without the bytes
    #[wasm_bindgen(js_name = exportReport)]
    pub fn export_report(&self) -> Result<JsValue, JsValue> {
        let (_, report) = self.inner.export_with_report().map_err(js_error)?;
        to_js(&report)
    }
}
