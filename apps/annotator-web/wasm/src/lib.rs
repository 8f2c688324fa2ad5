//! WASM bindings for the PDF annotator
//!
//! All annotation state lives in Rust. JavaScript renders pages, forwards
//! pointer and selection events, and draws the annotation list it gets back.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { AnnotatorSession } from './pkg/annotator_wasm.js';
//!
//! await init();
//!
//! const session = new AnnotatorSession(file.name, file.lastModified, bytes);
//! const tool = { zoomFactor: 1.5, activeTool: "freehand_draw",
//!                activeColor: "#ff0000", strokeWidth: 2, currentPage: 1 };
//! session.handleEvent(tool, { type: "pointer_down", x: 10, y: 10 });
//! session.handleEvent(tool, { type: "pointer_move", x: 40, y: 25 });
//! session.handleEvent(tool, { type: "pointer_up", x: 60, y: 30 });
//! const visible = session.annotationsForPage(1, 1.5);
//! downloadBlob(session.exportPdf(), "annotated.pdf");
//! ```

pub mod local_storage;
pub mod session;

use wasm_bindgen::prelude::*;

pub use local_storage::LocalStorageBackend;
pub use session::AnnotatorSession;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Page count of a PDF, or an error if it cannot be annotated
#[wasm_bindgen(js_name = pageCount)]
pub fn page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    annotator_core::page_count(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}
