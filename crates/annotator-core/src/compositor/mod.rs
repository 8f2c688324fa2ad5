//! Burns annotations into page content streams
//!
//! Each annotated page gets one extra content stream; the original content
//! is bracketed by `q … Q` so its graphics state cannot leak into ours.
//! Failures that concern a single annotation (bad media, a page the document
//! does not have) skip that annotation and are listed in the
//! [`ExportReport`]; only document-level failures abort the export.

pub mod draw;
pub mod image;
pub mod page;
pub mod text;

use crate::annotation::{Annotation, AnnotationId, AnnotationKind};
use crate::config::ExportConfig;
use crate::error::{AnnotatorError, Result};
use draw::PageCanvas;
use lopdf::{Document, ObjectId};
use page::PageAdditions;
use serde::Serialize;
use std::collections::BTreeMap;

/// Why an annotation was left out of an export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAnnotation {
    pub id: AnnotationId,
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub pages_annotated: usize,
    pub drawn: usize,
    pub skipped: Vec<SkippedAnnotation>,
}

/// Owned input for an export that can run on another thread
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub source: Vec<u8>,
    pub annotations: BTreeMap<u32, Vec<Annotation>>,
    pub config: ExportConfig,
}

impl ExportJob {
    pub fn run(&self) -> Result<(Vec<u8>, ExportReport)> {
        export_with_report(&self.source, &self.annotations, &self.config)
    }
}

/// Parse and reject documents we cannot write back
pub fn load_document(bytes: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        if e.to_string().to_lowercase().contains("encrypt") {
            AnnotatorError::Encrypted
        } else {
            AnnotatorError::ParseError(e.to_string())
        }
    })?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(AnnotatorError::Encrypted);
    }
    Ok(doc)
}

pub fn export(
    source: &[u8],
    annotations: &BTreeMap<u32, Vec<Annotation>>,
    config: &ExportConfig,
) -> Result<Vec<u8>> {
    export_with_report(source, annotations, config).map(|(bytes, _)| bytes)
}

pub fn export_with_report(
    source: &[u8],
    annotations: &BTreeMap<u32, Vec<Annotation>>,
    config: &ExportConfig,
) -> Result<(Vec<u8>, ExportReport)> {
    let mut doc = load_document(source)?;
    let mut report = ExportReport::default();

    if annotations.values().all(Vec::is_empty) {
        return Ok((source.to_vec(), report));
    }

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    let mut font_id: Option<ObjectId> = None;

    for (&page_number, page_annotations) in annotations {
        let Some(&page_id) = pages.get(&page_number) else {
            let reason = AnnotatorError::PageOutOfRange {
                page: page_number,
                page_count,
            }
            .to_string();
            tracing::warn!("Skipping {} annotation(s): {}", page_annotations.len(), reason);
            report
                .skipped
                .extend(page_annotations.iter().map(|a| SkippedAnnotation {
                    id: a.id(),
                    page: page_number,
                    reason: reason.clone(),
                }));
            continue;
        };

        let page_box = page::page_box(&doc, page_id);
        let names = page::ResourceNames::for_page(&doc, page_id);
        let mut canvas = PageCanvas::new(config, page_box).with_names(names);
        let mut additions = PageAdditions::default();
        let mut drawn = 0;

        for annotation in page_annotations {
            if let Some(media) = annotation.media() {
                let placed = image::decode_media(media)
                    .and_then(|raster| image::add_image_xobject(&mut doc, &raster));
                match placed {
                    Ok(xobject_id) => {
                        let name = canvas.image_name();
                        canvas.draw_image(annotation, &name);
                        additions.xobjects.push((name, xobject_id));
                        drawn += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping annotation {}: {}", annotation.id(), e);
                        report.skipped.push(SkippedAnnotation {
                            id: annotation.id(),
                            page: page_number,
                            reason: e.to_string(),
                        });
                    }
                }
                continue;
            }

            match annotation.kind() {
                AnnotationKind::Highlight => canvas.draw_highlight(annotation),
                AnnotationKind::Underline => canvas.draw_underline(annotation),
                AnnotationKind::Comment => canvas.draw_comment(annotation),
                AnnotationKind::Signature | AnnotationKind::FreehandDraw => {
                    canvas.draw_path(annotation)
                }
            }
            drawn += 1;
        }

        if canvas.is_empty() {
            continue;
        }
        if let Some(name) = canvas.font_name() {
            let id = *font_id.get_or_insert_with(|| page::add_helvetica(&mut doc));
            additions.font = Some((name.to_string(), id));
        }
        additions.ext_gstates = canvas.ext_gstates().collect();
        page::append_layer(&mut doc, page_id, canvas.into_operations(), &additions)?;

        tracing::debug!("Drew {} annotation(s) on page {}", drawn, page_number);
        report.pages_annotated += 1;
        report.drawn += drawn;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| AnnotatorError::SerializationError(e.to_string()))?;

    tracing::info!(
        "Exported {} annotation(s) on {} page(s), skipped {}",
        report.drawn,
        report.pages_annotated,
        report.skipped.len()
    );
    Ok((output, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{FileKey, Geometry, MediaPayload, NewAnnotation};
    use crate::coords::{Point, Rect};
    use crate::store::AnnotationStore;
    use lopdf::{dictionary, Object};

    fn create_test_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                }))
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn grouped(store: &AnnotationStore) -> BTreeMap<u32, Vec<Annotation>> {
        store.all_grouped_by_page()
    }

    fn path_on(page: u32) -> NewAnnotation {
        NewAnnotation::new(
            AnnotationKind::FreehandDraw,
            page,
            Geometry::Path {
                points: vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            },
            1.0,
        )
    }

    #[test]
    fn test_empty_grouping_returns_source() {
        let pdf = create_test_pdf(1);
        let result = export(&pdf, &BTreeMap::new(), &ExportConfig::default()).unwrap();
        assert_eq!(result, pdf);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = export(b"not a pdf", &BTreeMap::new(), &ExportConfig::default()).unwrap_err();
        assert!(matches!(err, AnnotatorError::ParseError(_)));
    }

    fn encrypted(pdf: &[u8]) -> Vec<u8> {
        let mut doc = Document::load_mem(pdf).unwrap();
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_encrypted_document_is_rejected() {
        let pdf = encrypted(&create_test_pdf(1));
        assert!(matches!(load_document(&pdf), Err(AnnotatorError::Encrypted)));

        let mut store = AnnotationStore::in_memory();
        store.create(path_on(1));
        let err = export(&pdf, &grouped(&store), &ExportConfig::default()).unwrap_err();
        assert!(matches!(err, AnnotatorError::Encrypted));
    }

    #[test]
    fn test_reexport_keeps_earlier_resources() {
        let signature = |y: f64| {
            NewAnnotation::new(
                AnnotationKind::Signature,
                1,
                Geometry::Image {
                    rect: Rect::new(100.0, y, 80.0, 40.0),
                    media: MediaPayload::from_png_bytes(&image::tests::rgba_png(4, 2)),
                },
                1.0,
            )
        };
        let mut first = AnnotationStore::in_memory();
        first.create(signature(100.0));
        let source = create_test_pdf(1);
        let once = export(&source, &grouped(&first), &ExportConfig::default()).unwrap();

        let mut second = AnnotationStore::in_memory();
        second.create(signature(300.0));
        let twice = export(&once, &grouped(&second), &ExportConfig::default()).unwrap();

        let doc = Document::load_mem(&twice).unwrap();
        let page_id = doc.get_pages()[&1];
        let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string();
        assert!(content.contains("/AnIm0 Do"));
        assert!(content.contains("/AnIm1 Do"));

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let first_image = xobjects.get(b"AnIm0").unwrap().as_reference().unwrap();
        let second_image = xobjects.get(b"AnIm1").unwrap().as_reference().unwrap();
        assert_ne!(first_image, second_image);
    }

    #[test]
    fn test_out_of_range_page_is_skipped() {
        let pdf = create_test_pdf(3);
        let mut store = AnnotationStore::in_memory();
        store.open_file(FileKey::url("t"));
        store.create(path_on(1));
        let lost = store.create(path_on(5));

        let (bytes, report) =
            export_with_report(&pdf, &grouped(&store), &ExportConfig::default()).unwrap();
        assert_eq!(report.drawn, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, lost.id());
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 3);
    }

    #[test]
    fn test_bad_media_is_skipped_rest_drawn() {
        let pdf = create_test_pdf(1);
        let mut store = AnnotationStore::in_memory();
        store.create(path_on(1));
        let bad = store.create(NewAnnotation::new(
            AnnotationKind::Signature,
            1,
            Geometry::Image {
                rect: Rect::new(0.0, 0.0, 50.0, 20.0),
                media: MediaPayload::from_data_url("data:image/png;base64,AAAA"),
            },
            1.0,
        ));

        let (_, report) =
            export_with_report(&pdf, &grouped(&store), &ExportConfig::default()).unwrap();
        assert_eq!(report.drawn, 1);
        assert_eq!(report.pages_annotated, 1);
        assert_eq!(report.skipped[0].id, bad.id());
    }

    #[test]
    fn test_image_signature_is_placed() {
        let pdf = create_test_pdf(1);
        let mut store = AnnotationStore::in_memory();
        store.create(NewAnnotation::new(
            AnnotationKind::Signature,
            1,
            Geometry::Image {
                rect: Rect::new(100.0, 100.0, 80.0, 40.0),
                media: MediaPayload::from_png_bytes(&image::tests::rgba_png(4, 2)),
            },
            1.0,
        ));
        let (bytes, report) =
            export_with_report(&pdf, &grouped(&store), &ExportConfig::default()).unwrap();
        assert!(report.skipped.is_empty());

        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = doc.get_pages()[&1];
        let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string();
        assert!(content.contains("/AnIm0 Do"));
    }

    #[test]
    fn test_export_job_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<ExportJob>();
    }
}
