//! Shared fixtures for integration tests

#![allow(dead_code)]

use annotator_core::{AnnotationSession, AnnotatorConfig, ExportConfig, FileKey};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Build an uncompressed PDF with `pages` Letter-sized pages, each with a
/// small text content stream.
pub fn create_test_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", i + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }
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

/// Export config where one normalized pixel is one PDF point
pub fn unit_scale_config() -> AnnotatorConfig {
    AnnotatorConfig {
        export: ExportConfig {
            capture_dpi: 72.0,
            ..ExportConfig::default()
        },
        ..AnnotatorConfig::default()
    }
}

pub fn open_session(config: AnnotatorConfig, pages: usize) -> AnnotationSession {
    let mut session =
        AnnotationSession::new(config, Box::new(annotator_core::MemoryBackend::new()));
    session
        .open_document(create_test_pdf(pages), FileKey::local("fixture.pdf", 1_700_000_000_000))
        .unwrap();
    session
}

/// Decoded operators of one page (all content streams concatenated)
pub fn page_operations(pdf: &[u8], page: u32) -> Vec<Operation> {
    let doc = Document::load_mem(pdf).unwrap();
    let page_id = doc.get_pages()[&page];
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content).unwrap().operations
}

pub fn count(ops: &[Operation], operator: &str) -> usize {
    ops.iter().filter(|o| o.operator == operator).count()
}

pub fn numbers(op: &Operation) -> Vec<f64> {
    op.operands
        .iter()
        .filter_map(|o| match o {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(f64::from(*r)),
            _ => None,
        })
        .collect()
}

pub fn approx(actual: &[f64], expected: &[f64]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (a - e).abs() < 0.01)
}

pub fn text_operands(ops: &[Operation]) -> Vec<Vec<u8>> {
    ops.iter()
        .filter(|o| o.operator == "Tj")
        .filter_map(|o| match o.operands.first() {
            Some(Object::String(bytes, _)) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}
