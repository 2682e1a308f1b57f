// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test-only builders for synthetic PDF documents.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

/// Build a document with one page per marker string. Each page carries a
/// `/F1` Helvetica font resource and a `BT /F1 Tf (marker) Tj ET` content
/// stream, so text markers double as page-order probes.
pub(crate) fn doc_with_pages(markers: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut kids = Vec::new();
    for marker in markers {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        marker.as_bytes().to_vec(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        )));

        let resources = Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "F1",
                Object::Reference(font_id),
            )])),
        )]);

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(markers.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc
}

/// Build a one-page document shaped like tesseract's OCR output: an image
/// XObject drawn over the page plus an invisible text layer.
pub(crate) fn ocr_shaped_doc(marker: &str) -> Document {
    let mut doc = doc_with_pages(&[marker]);
    let page_id = *doc.get_pages().values().next().unwrap();

    let image = Stream::new(
        Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(8)),
            ("Height", Object::Integer(8)),
            ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]),
        vec![0u8; 64],
    );
    let image_id = doc.add_object(Object::Stream(image));

    // Draw the image before the text, as tesseract does.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(612),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(792),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            // Rendering mode 3: invisible text.
            Operation::new("Tr", vec![Object::Integer(3)]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
            ),
            Operation::new("Td", vec![Object::Integer(10), Object::Integer(10)]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    marker.as_bytes().to_vec(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        content.encode().unwrap(),
    )));

    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Contents", Object::Reference(content_id));
    }

    // Register the XObject in the page resources.
    let resources_id = {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };
    let xobjects = Object::Dictionary(Dictionary::from_iter(vec![(
        "Im1",
        Object::Reference(image_id),
    )]));
    match resources_id {
        Some(id) => {
            if let Ok(Object::Dictionary(resources)) = doc.get_object_mut(id) {
                resources.set("XObject", xobjects);
            }
        }
        None => {
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                if let Ok(Object::Dictionary(resources)) = page.get_mut(b"Resources") {
                    resources.set("XObject", xobjects);
                }
            }
        }
    }

    doc
}

/// Collect every `Tj` string operand, page by page, in page order.
pub(crate) fn page_text_markers(doc: &Document) -> Vec<String> {
    let mut markers = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let raw = doc.get_page_content(page_id).unwrap_or_default();
        let content = Content::decode(&raw).unwrap_or(Content { operations: vec![] });
        for op in &content.operations {
            if op.operator == "Tj" {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    markers.push(String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }
    }
    markers
}

/// Serialize a document to disk.
pub(crate) fn save_to_file(doc: &mut Document, path: &Path) {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    std::fs::write(path, bytes).unwrap();
}
