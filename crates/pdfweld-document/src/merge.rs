// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Programmatic multibackground merge — composite the assembled text overlay
// onto the original document, page by page, producing the sandwich PDF.
//
// For every page the overlay page's content stream is appended after the
// original content (isolated in q…Q so the original cannot leak graphics
// state into the text layer) behind a `cm` matrix that maps the overlay's
// MediaBox onto the original page's MediaBox. Overlay resources are copied
// across under fresh names, since overlay and original may both define e.g.
// a /Font resource named /F1.

use std::collections::HashMap;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfweld_core::error::{Result, WeldError};
use tracing::{debug, info, instrument, warn};

use crate::pages::{PageImporter, decode_page_content, deref, page_media_box, page_resources};

/// Resource categories that get merged, and the content operator whose name
/// operand selects from each.
const RENAMED_CATEGORIES: [(&str, &str); 3] =
    [("Font", "Tf"), ("XObject", "Do"), ("ExtGState", "gs")];

/// Composite `overlay_path` onto `base_path`, writing the merged document to
/// `destination`.
///
/// Pages beyond the overlay's page count are carried over untouched (OCR may
/// have failed for individual pages); a page-count mismatch is logged, never
/// fatal here — the pipeline has already reported the holes.
#[instrument(skip_all, fields(
    base = %base_path.as_ref().display(),
    overlay = %overlay_path.as_ref().display(),
))]
pub fn overlay_onto(
    base_path: impl AsRef<Path>,
    overlay_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
) -> Result<()> {
    let base_path = base_path.as_ref();
    let mut base = Document::load(base_path).map_err(|err| {
        WeldError::Merge(format!(
            "failed to load merge base {}: {err}",
            base_path.display()
        ))
    })?;
    let overlay_path = overlay_path.as_ref();
    let overlay = Document::load(overlay_path).map_err(|err| {
        WeldError::Merge(format!(
            "failed to load overlay {}: {err}",
            overlay_path.display()
        ))
    })?;

    let base_pages = base.get_pages();
    let overlay_pages = overlay.get_pages();
    if base_pages.len() != overlay_pages.len() {
        warn!(
            base_pages = base_pages.len(),
            overlay_pages = overlay_pages.len(),
            "page counts differ; pages without an overlay stay untouched"
        );
    }

    let mut importer = PageImporter::new(&overlay);
    let mut name_counter = 0usize;
    let mut welded = 0usize;

    for (&page_number, &base_id) in &base_pages {
        match overlay_pages.get(&page_number) {
            Some(&overlay_id) => {
                weld_page(&mut base, base_id, &overlay, overlay_id, &mut importer, &mut name_counter)?;
                welded += 1;
            }
            None => warn!(page_number, "no overlay page; leaving original page untouched"),
        }
    }

    base.compress();
    let mut bytes = Vec::new();
    base.save_to(&mut bytes)
        .map_err(|err| WeldError::Merge(format!("failed to serialise merged PDF: {err}")))?;
    std::fs::write(destination.as_ref(), &bytes)?;

    info!(pages = base_pages.len(), welded, "overlay merged onto base document");
    Ok(())
}

/// Append one overlay page's text layer to one base page.
fn weld_page(
    base: &mut Document,
    base_id: ObjectId,
    overlay: &Document,
    overlay_id: ObjectId,
    importer: &mut PageImporter<'_>,
    name_counter: &mut usize,
) -> Result<()> {
    let base_box = page_media_box(base, base_id)?;
    let overlay_box = page_media_box(overlay, overlay_id)?;

    let overlay_w = overlay_box[2] - overlay_box[0];
    let overlay_h = overlay_box[3] - overlay_box[1];
    if overlay_w <= 0.0 || overlay_h <= 0.0 {
        return Err(WeldError::Merge(format!(
            "overlay page has degenerate MediaBox {overlay_box:?}"
        )));
    }
    let scale_x = (base_box[2] - base_box[0]) / overlay_w;
    let scale_y = (base_box[3] - base_box[1]) / overlay_h;
    let translate_x = base_box[0] - scale_x * overlay_box[0];
    let translate_y = base_box[1] - scale_y * overlay_box[1];

    // Copy the overlay page's resources into the base document under fresh
    // names, collecting the rename map per category.
    let overlay_resources = page_resources(overlay, overlay_id)?;
    let mut renames: HashMap<(&'static str, Vec<u8>), Vec<u8>> = HashMap::new();
    let mut pending: Vec<(&'static str, Vec<u8>, Object)> = Vec::new();

    let mut base_resources = page_resources(base, base_id)?;

    for (category, _) in RENAMED_CATEGORIES {
        let Ok(entries) = overlay_resources.get(category.as_bytes()) else {
            continue;
        };
        let Ok(entries) = deref(overlay, entries).as_dict() else {
            continue;
        };
        let existing = owned_category(base, &base_resources, category)?;
        for (name, value) in entries.iter() {
            let fresh = fresh_name(category, &existing, name_counter);
            renames.insert((category, name.clone()), fresh.clone());
            let cloned = importer.clone_value(base, value)?;
            pending.push((category, fresh, cloned));
        }
    }

    // Materialize the touched categories on the page's own resource
    // dictionary (inherited resources must not be mutated in place).
    for (category, name, value) in pending {
        let mut entries = owned_category(base, &base_resources, category)?;
        entries.set(name, value);
        base_resources.set(category, Object::Dictionary(entries));
    }

    // Rewrite the overlay content to use the fresh resource names, then
    // wrap it in q…Q behind the scale matrix.
    let overlay_content = decode_page_content(overlay, overlay_id)?;
    let mut operations = Vec::with_capacity(overlay_content.operations.len() + 3);
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new(
        "cm",
        vec![
            Object::Real(scale_x),
            Object::Real(0.0),
            Object::Real(0.0),
            Object::Real(scale_y),
            Object::Real(translate_x),
            Object::Real(translate_y),
        ],
    ));
    for mut op in overlay_content.operations {
        rewrite_resource_name(&mut op, &renames);
        operations.push(op);
    }
    operations.push(Operation::new("Q", vec![]));

    let encoded = Content { operations }
        .encode()
        .map_err(|err| WeldError::Merge(format!("failed to encode overlay content: {err}")))?;
    let overlay_stream_id = base.add_object(Object::Stream(Stream::new(Dictionary::new(), encoded)));

    // Isolate the original content in its own q…Q, then append the overlay.
    let push_id = base.add_object(Object::Stream(Stream::new(Dictionary::new(), b"q\n".to_vec())));
    let pop_id = base.add_object(Object::Stream(Stream::new(Dictionary::new(), b"Q\n".to_vec())));

    let existing_contents = existing_content_refs(base, base_id);

    let page = base
        .get_object_mut(base_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| WeldError::Merge(format!("base page is not a dictionary: {err}")))?;

    let mut contents = Vec::with_capacity(existing_contents.len() + 3);
    contents.push(Object::Reference(push_id));
    contents.extend(existing_contents);
    contents.push(Object::Reference(pop_id));
    contents.push(Object::Reference(overlay_stream_id));
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(base_resources));

    debug!(?base_id, scale_x, scale_y, "page welded");
    Ok(())
}

/// The page's current /Contents as a flat list of stream references.
fn existing_content_refs(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            // /Contents may be an indirect reference to an array.
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}

/// An owned copy of one resource category dictionary from the given
/// resources, resolving an indirect reference if needed.
fn owned_category(doc: &Document, resources: &Dictionary, category: &str) -> Result<Dictionary> {
    match resources.get(category.as_bytes()) {
        Ok(value) => match deref(doc, value) {
            Object::Dictionary(dict) => Ok(dict.clone()),
            other => Err(WeldError::Merge(format!(
                "resource category /{category} is not a dictionary: {other:?}"
            ))),
        },
        Err(_) => Ok(Dictionary::new()),
    }
}

/// Generate a resource name that collides with nothing in the target
/// category dictionary.
fn fresh_name(category: &str, existing: &Dictionary, counter: &mut usize) -> Vec<u8> {
    let tag = &category[..1]; // F / X / E
    loop {
        let candidate = format!("ov{tag}{counter}");
        *counter += 1;
        if !existing.has(candidate.as_bytes()) {
            return candidate.into_bytes();
        }
    }
}

/// Rewrite the name operand of resource-selecting operators according to the
/// rename map for the operator's category.
fn rewrite_resource_name(op: &mut Operation, renames: &HashMap<(&'static str, Vec<u8>), Vec<u8>>) {
    let category = RENAMED_CATEGORIES
        .iter()
        .find(|(_, operator)| *operator == op.operator)
        .map(|(category, _)| *category);
    let Some(category) = category else {
        return;
    };
    if let Some(Object::Name(name)) = op.operands.first_mut() {
        if let Some(fresh) = renames.get(&(category, name.clone())) {
            *name = fresh.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdoc::{doc_with_pages, page_text_markers, save_to_file};
    use std::path::PathBuf;

    fn write_doc(dir: &Path, name: &str, markers: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut doc = doc_with_pages(markers);
        save_to_file(&mut doc, &path);
        path
    }

    #[test]
    fn merged_pages_carry_both_text_layers() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_doc(dir.path(), "base.pdf", &["original one", "original two"]);
        let overlay = write_doc(dir.path(), "overlay.pdf", &["ocr one", "ocr two"]);
        let out = dir.path().join("merged.pdf");

        overlay_onto(&base, &overlay, &out).unwrap();

        let merged = Document::load(&out).unwrap();
        assert_eq!(merged.get_pages().len(), 2);
        assert_eq!(
            page_text_markers(&merged),
            vec!["original one", "ocr one", "original two", "ocr two"]
        );
    }

    #[test]
    fn colliding_font_names_are_namespaced() {
        let dir = tempfile::tempdir().unwrap();
        // Both documents define /F1 — the overlay's must be renamed.
        let base = write_doc(dir.path(), "base.pdf", &["body"]);
        let overlay = write_doc(dir.path(), "overlay.pdf", &["layer"]);
        let out = dir.path().join("merged.pdf");

        overlay_onto(&base, &overlay, &out).unwrap();

        let merged = Document::load(&out).unwrap();
        let page_id = *merged.get_pages().values().next().unwrap();
        let resources = page_resources(&merged, page_id).unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"), "original font name lost");
        assert!(
            fonts.iter().any(|(name, _)| name.starts_with(b"ovF")),
            "overlay font was not renamed into the page resources"
        );

        // The overlay content must select the renamed font, and both text
        // layers must survive.
        let content = decode_page_content(&merged, page_id).unwrap();
        let selected: Vec<&[u8]> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tf")
            .filter_map(|op| match op.operands.first() {
                Some(Object::Name(name)) => Some(name.as_slice()),
                _ => None,
            })
            .collect();
        assert!(selected.contains(&b"F1".as_slice()));
        assert!(selected.iter().any(|name| name.starts_with(b"ovF")));
        assert_eq!(page_text_markers(&merged), vec!["body", "layer"]);
    }

    #[test]
    fn missing_overlay_pages_leave_base_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_doc(dir.path(), "base.pdf", &["p1", "p2", "p3"]);
        // Overlay only covers the first page (OCR failed for the rest).
        let overlay = write_doc(dir.path(), "overlay.pdf", &["ocr p1"]);
        let out = dir.path().join("merged.pdf");

        overlay_onto(&base, &overlay, &out).unwrap();

        let merged = Document::load(&out).unwrap();
        assert_eq!(merged.get_pages().len(), 3);
        assert_eq!(page_text_markers(&merged), vec!["p1", "ocr p1", "p2", "p3"]);
    }

    #[test]
    fn unloadable_base_is_a_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("broken.pdf");
        std::fs::write(&base, b"not a pdf").unwrap();
        let overlay = write_doc(dir.path(), "overlay.pdf", &["x"]);
        let out = dir.path().join("merged.pdf");

        let err = overlay_onto(&base, &overlay, &out).unwrap_err();
        assert!(matches!(err, WeldError::Merge(_)), "got {err:?}");
        assert!(!out.exists(), "merge failure must not leave a candidate file");
    }
}
