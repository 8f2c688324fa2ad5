//! Page tree helpers: inherited attributes, resources and content streams

use crate::error::{AnnotatorError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, BTreeSet};

/// Resource categories an annotation layer writes into
const CATEGORIES: [&[u8]; 3] = [b"Font", b"ExtGState", b"XObject"];

/// Effective MediaBox of a page in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub const US_LETTER: PageBox = PageBox {
        x: 0.0,
        y: 0.0,
        width: 612.0,
        height: 792.0,
    };
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up `key` on the page or the nearest ancestor that defines it
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    // Parent chains are short; the bound only guards against cycles
    for _ in 0..64 {
        let dict = doc.get_object(current?).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

/// MediaBox of the page, inherited through `Parent`; Letter when absent or invalid
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let parsed = inherited(doc, page_id, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            let values: Vec<f64> = arr
                .iter()
                .filter_map(|o| resolve(doc, o).and_then(number))
                .collect();
            match values.as_slice() {
                [llx, lly, urx, ury] => Some(PageBox {
                    x: llx.min(*urx),
                    y: lly.min(*ury),
                    width: (urx - llx).abs(),
                    height: (ury - lly).abs(),
                }),
                _ => None,
            }
        })
        .filter(|b| b.width > 0.0 && b.height > 0.0);

    parsed.unwrap_or_else(|| {
        tracing::warn!("Page {:?} has no usable MediaBox, assuming US Letter", page_id);
        PageBox::US_LETTER
    })
}

/// Copy the page's effective resources (inherited or referenced) into an
/// owned dictionary whose category sub-dictionaries are inline.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    for category in CATEGORIES {
        let inline = resources
            .get(category)
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .cloned();
        if let Some(dict) = inline {
            resources.set(category.to_vec(), Object::Dictionary(dict));
        }
    }
    resources
}

fn category_mut<'a>(resources: &'a mut Dictionary, category: &[u8]) -> Result<&'a mut Dictionary> {
    if !matches!(resources.get(category), Ok(Object::Dictionary(_))) {
        resources.set(category.to_vec(), Object::Dictionary(Dictionary::new()));
    }
    match resources.get_mut(category) {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        _ => Err(AnnotatorError::OperationError(format!(
            "resource category {} is not a dictionary",
            String::from_utf8_lossy(category)
        ))),
    }
}

/// Resource names in use on a page, so a new layer never rebinds a name
/// that an earlier layer (or the original content) already draws with.
#[derive(Debug, Clone, Default)]
pub struct ResourceNames {
    taken: BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>,
}

impl ResourceNames {
    pub fn for_page(doc: &Document, page_id: ObjectId) -> Self {
        let resources = effective_resources(doc, page_id);
        let mut taken = BTreeMap::new();
        for category in CATEGORIES {
            if let Ok(Object::Dictionary(dict)) = resources.get(category) {
                let names: BTreeSet<Vec<u8>> = dict.iter().map(|(k, _)| k.clone()).collect();
                taken.insert(category.to_vec(), names);
            }
        }
        Self { taken }
    }

    /// Reserve the first `{prefix}{n}` not yet used in `category`
    pub fn fresh(&mut self, category: &[u8], prefix: &str) -> String {
        let used = self.taken.entry(category.to_vec()).or_default();
        let mut index = 0usize;
        loop {
            let name = format!("{}{}", prefix, index);
            if used.insert(name.as_bytes().to_vec()) {
                return name;
            }
            index += 1;
        }
    }
}

/// Resources an annotation layer adds to a page
#[derive(Debug, Default)]
pub struct PageAdditions {
    pub font: Option<(String, ObjectId)>,
    pub ext_gstates: Vec<(String, f64)>,
    pub xobjects: Vec<(String, ObjectId)>,
}

/// Standard Helvetica with WinAnsi encoding, shared by every annotated page
pub fn add_helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Wrap the existing content in `q … Q`, append `operations` as a new
/// stream and merge `additions` into the page's own resources.
pub fn append_layer(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
    additions: &PageAdditions,
) -> Result<()> {
    let mut resources = effective_resources(doc, page_id);
    if let Some((name, font_id)) = &additions.font {
        category_mut(&mut resources, b"Font")?.set(name.as_bytes().to_vec(), *font_id);
    }
    for (name, alpha) in &additions.ext_gstates {
        let alpha = *alpha as f32;
        category_mut(&mut resources, b"ExtGState")?.set(
            name.as_bytes().to_vec(),
            dictionary! {
                "Type" => "ExtGState",
                "ca" => Object::Real(alpha),
                "CA" => Object::Real(alpha),
            },
        );
    }
    for (name, xobject_id) in &additions.xobjects {
        category_mut(&mut resources, b"XObject")?.set(name.as_bytes().to_vec(), *xobject_id);
    }

    let layer = Content { operations }
        .encode()
        .map_err(|e| AnnotatorError::OperationError(format!("encode content: {}", e)))?;
    // Leading newline keeps the operator apart from the previous stream's last token
    let mut tail = b"\nQ\n".to_vec();
    tail.extend_from_slice(&layer);

    let head_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let tail_id = doc.add_object(Stream::new(Dictionary::new(), tail));

    let existing: Vec<Object> = {
        let page = doc.get_object(page_id).and_then(|o| o.as_dict())?;
        match page.get(b"Contents") {
            // An indirect array is spliced in; a reference to a stream is kept
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };
    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(head_id));
    contents.extend(existing);
    contents.push(Object::Reference(tail_id));

    let page = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut())?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}
