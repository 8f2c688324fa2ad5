//! `window.localStorage` as an annotation persistence backend

use annotator_core::{AnnotatorError, PersistenceBackend, Result};
use wasm_bindgen::JsValue;

fn storage_error(context: &str, e: JsValue) -> AnnotatorError {
    let detail = e.as_string().unwrap_or_else(|| format!("{:?}", e));
    AnnotatorError::PersistenceError(format!("{}: {}", context, detail))
}

pub struct LocalStorageBackend {
    storage: web_sys::Storage,
}

impl LocalStorageBackend {
    /// `None` when there is no window or storage is disabled (private mode)
    pub fn from_window() -> Option<Self> {
        let window = web_sys::window()?;
        let storage = window.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

impl PersistenceBackend for LocalStorageBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|e| storage_error("localStorage read", e))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        // Throws QuotaExceededError when full
        self.storage
            .set_item(key, value)
            .map_err(|e| storage_error("localStorage write", e))
    }
}
