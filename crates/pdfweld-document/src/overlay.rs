// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR overlay post-processing.
//
// Tesseract's per-page PDF output embeds the OCR source image underneath the
// recognized (invisible) text. Stripping that image is what turns the page
// into a pure text overlay that can later be composited over the original
// page content — and it shrinks the per-page artifact by orders of magnitude.

use std::path::Path;

use lopdf::{Document, Object};
use pdfweld_core::error::{Result, WeldError};
use tracing::{debug, instrument};

use crate::pages::{PageImporter, blank_document, decode_page_content, set_page_content};

/// Operators removed from the overlay content stream: XObject painting and
/// inline images.
const IMAGE_OPERATORS: [&str; 4] = ["Do", "BI", "ID", "EI"];

/// Rewrite a one-page OCR output document in place, keeping only its text
/// layer.
///
/// The page is copied into a fresh document, image-painting operators are
/// dropped from its content stream, the resource dictionary's /XObject entry
/// is replaced with an empty object list, and the result is recompressed
/// over the original file.
///
/// # Errors
///
/// Returns [`WeldError::Internal`] if the document does not have exactly one
/// page. Upstream maps one image to one OCR invocation, so anything else
/// means a logic defect, not bad input.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn strip_embedded_image(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let source = Document::load(path).map_err(|err| {
        WeldError::Pdf(format!(
            "failed to load OCR output {}: {err}",
            path.display()
        ))
    })?;

    let pages = source.get_pages();
    if pages.len() != 1 {
        return Err(WeldError::Internal(format!(
            "OCR produced a {}-page document for {}; expected exactly one page",
            pages.len(),
            path.display()
        )));
    }
    let page_id = *pages.values().next().expect("page count checked above");

    let mut stripped = blank_document();
    let mut importer = PageImporter::new(&source);
    let new_page_id = importer.append_page(&mut stripped, page_id)?;

    drop_image_operators(&mut stripped, new_page_id)?;
    clear_xobjects(&mut stripped, new_page_id)?;

    // The cloned image stream is unreachable now; drop it from the object
    // table before writing, then recompress.
    stripped.prune_objects();
    stripped.compress();
    let mut bytes = Vec::new();
    stripped.save_to(&mut bytes).map_err(|err| {
        WeldError::Pdf(format!("failed to serialise stripped overlay: {err}"))
    })?;
    std::fs::write(path, &bytes)?;

    debug!(bytes = bytes.len(), "overlay stripped to text-only");
    Ok(())
}

/// Remove image-painting operators from the page's content stream and
/// re-encode it as a single stream.
fn drop_image_operators(doc: &mut Document, page_id: lopdf::ObjectId) -> Result<()> {
    let mut content = decode_page_content(doc, page_id)?;
    let before = content.operations.len();
    content
        .operations
        .retain(|op| !IMAGE_OPERATORS.contains(&op.operator.as_str()));
    debug!(
        removed = before - content.operations.len(),
        "image operators removed"
    );
    set_page_content(doc, page_id, &content)
}

/// Replace the page resource dictionary's /XObject entry with an empty
/// object list, detaching the embedded OCR image.
fn clear_xobjects(doc: &mut Document, page_id: lopdf::ObjectId) -> Result<()> {
    let resources_ref = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|err| WeldError::Pdf(format!("overlay page is not a dictionary: {err}")))?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };

    let empty = Object::Array(Vec::new());
    match resources_ref {
        Some(resources_id) => {
            if let Ok(Object::Dictionary(resources)) = doc.get_object_mut(resources_id) {
                resources.set("XObject", empty);
            }
        }
        None => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|err| {
                    WeldError::Pdf(format!("overlay page is not a dictionary: {err}"))
                })?;
            match page.get_mut(b"Resources") {
                Ok(Object::Dictionary(resources)) => resources.set("XObject", empty),
                _ => {
                    let mut resources = lopdf::Dictionary::new();
                    resources.set("XObject", empty);
                    page.set("Resources", Object::Dictionary(resources));
                }
            }
        }
    }
    Ok(())
}
