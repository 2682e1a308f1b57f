// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input PDF inspection — page count, encryption, Info metadata, and a
// best-effort check for an existing text layer.
//
// The input is read exactly once, here; every later stage works from the
// returned facts and never re-opens the original for inspection.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfweld_core::error::{Result, WeldError};
use pdfweld_core::types::DocumentInfo;
use tracing::{debug, info, instrument, warn};

/// Recursion guard for the font walk over page resource trees.
const FONT_WALK_MAX_DEPTH: usize = 8;

/// Inspect a PDF input file.
///
/// # Errors
///
/// Returns [`WeldError::Input`] when the file is corrupt beyond recognition.
/// Encrypted files that lopdf refuses to open are NOT an error: they come
/// back with `encrypted: true` and an unknown page count, and the pipeline
/// routes them to the rebuild-from-images path.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn inspect_pdf(path: impl AsRef<Path>) -> Result<DocumentInfo> {
    let path = path.as_ref();
    let doc = match Document::load(path) {
        Ok(doc) => doc,
        Err(err) => return inspect_unloadable(path, &err.to_string()),
    };

    let encrypted = doc.trailer.get(b"Encrypt").is_ok();

    let pages = doc.get_pages();
    let page_count = if pages.is_empty() {
        warn!("could not read input file number of pages");
        None
    } else {
        Some(pages.len() as u32)
    };

    // Metadata from an encrypted Info dictionary is garbage; skip it, the
    // finalizer will then stamp a fresh producer entry.
    let metadata = if encrypted {
        BTreeMap::new()
    } else {
        read_info_metadata(&doc)
    };

    let has_text = pages.values().any(|page_id| page_has_fonts(&doc, *page_id));

    info!(
        pages = ?page_count,
        encrypted,
        has_text,
        metadata_entries = metadata.len(),
        "input PDF inspected"
    );

    Ok(DocumentInfo {
        page_count,
        encrypted,
        has_text,
        metadata,
    })
}

/// Fallback for files lopdf cannot open: distinguish "encrypted" from
/// "corrupt" by scanning for a trailer /Encrypt marker.
fn inspect_unloadable(path: &Path, parse_err: &str) -> Result<DocumentInfo> {
    let bytes = std::fs::read(path)?;
    if contains(&bytes, b"/Encrypt") {
        warn!(
            "input cannot be parsed ({parse_err}); /Encrypt marker found, treating as encrypted"
        );
        return Ok(DocumentInfo {
            page_count: None,
            encrypted: true,
            has_text: false,
            metadata: BTreeMap::new(),
        });
    }
    Err(WeldError::Input(format!(
        "corrupted PDF file {}: {parse_err}",
        path.display()
    )))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Extract string-representable entries from the Info dictionary.
/// Entries with non-string or non-UTF-8 values are dropped with a warning.
fn read_info_metadata(doc: &Document) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    let info_dict = match doc.trailer.get(b"Info") {
        Ok(value) => match resolve(doc, value).and_then(|obj| obj.as_dict().ok()) {
            Some(dict) => dict,
            None => return metadata,
        },
        Err(_) => return metadata,
    };

    for (key, value) in info_dict.iter() {
        let key = String::from_utf8_lossy(key).into_owned();
        match resolve(doc, value) {
            Some(Object::String(bytes, _)) => match String::from_utf8(bytes.clone()) {
                Ok(text) => {
                    metadata.insert(key, text);
                }
                Err(_) => warn!(%key, "metadata value is not valid UTF-8, not copied"),
            },
            _ => warn!(%key, "metadata value is not a text string, not copied"),
        }
    }

    debug!(entries = metadata.len(), "Info metadata read");
    metadata
}

fn resolve<'a>(doc: &'a Document, value: &'a Object) -> Option<&'a Object> {
    match value {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Best-effort detection of a text layer: walk the page's resource tree
/// looking for font markers (/BaseFont, or /FontName next to an embedded
/// /FontFile*). Purely informational — a miss never changes control flow
/// beyond the --check-text gate.
fn page_has_fonts(doc: &Document, page_id: ObjectId) -> bool {
    let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) else {
        return false;
    };
    let Ok(resources) = page.get(b"Resources") else {
        return false;
    };
    let mut visited = HashSet::new();
    walk_for_fonts(doc, resources, 0, &mut visited)
}

fn walk_for_fonts(
    doc: &Document,
    value: &Object,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
) -> bool {
    if depth > FONT_WALK_MAX_DEPTH {
        return false;
    }
    let value = match value {
        Object::Reference(id) => {
            if !visited.insert(*id) {
                return false;
            }
            match doc.get_object(*id) {
                Ok(obj) => obj,
                Err(_) => return false,
            }
        }
        other => other,
    };

    let dict: &Dictionary = match value {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        Object::Array(items) => {
            return items
                .iter()
                .any(|item| walk_for_fonts(doc, item, depth + 1, visited));
        }
        _ => return false,
    };

    if dict.has(b"BaseFont") {
        return true;
    }
    if dict.has(b"FontName")
        && (dict.has(b"FontFile") || dict.has(b"FontFile2") || dict.has(b"FontFile3"))
    {
        return true;
    }

    dict.iter()
        .any(|(_, child)| walk_for_fonts(doc, child, depth + 1, visited))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdoc::{doc_with_pages, save_to_file};
    use lopdf::{Dictionary, Object};

    #[test]
    fn inspect_reads_page_count_and_text_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.pdf");
        let mut doc = doc_with_pages(&["a", "b", "c"]);
        save_to_file(&mut doc, &path);

        let info = inspect_pdf(&path).unwrap();
        assert_eq!(info.page_count, Some(3));
        assert!(!info.encrypted);
        // Test pages carry a /F1 font resource, so the text probe fires.
        assert!(info.has_text);
    }

    #[test]
    fn inspect_reads_string_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.pdf");
        let mut doc = doc_with_pages(&["a"]);

        let info_dict = Dictionary::from_iter(vec![
            (
                "Producer",
                Object::string_literal("Scanner Co. firmware 1.2"),
            ),
            ("Title", Object::string_literal("Receipts")),
            // Not a text string — must be dropped.
            ("PageLayout", Object::Integer(2)),
        ]);
        let info_id = doc.add_object(Object::Dictionary(info_dict));
        doc.trailer.set("Info", Object::Reference(info_id));
        save_to_file(&mut doc, &path);

        let info = inspect_pdf(&path).unwrap();
        assert_eq!(
            info.metadata.get("Producer").map(String::as_str),
            Some("Scanner Co. firmware 1.2")
        );
        assert_eq!(info.metadata.get("Title").map(String::as_str), Some("Receipts"));
        assert!(!info.metadata.contains_key("PageLayout"));
    }

    #[test]
    fn pages_without_fonts_report_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.pdf");
        let mut doc = doc_with_pages(&["a"]);

        // Remove the font resources from every page.
        let page_ids: Vec<_> = doc.get_pages().values().copied().collect();
        for page_id in page_ids {
            if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
                page.set("Resources", Object::Dictionary(Dictionary::new()));
            }
        }
        save_to_file(&mut doc, &path);

        let info = inspect_pdf(&path).unwrap();
        assert!(!info.has_text);
    }

    #[test]
    fn garbage_input_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        let err = inspect_pdf(&path).unwrap_err();
        assert!(matches!(err, WeldError::Input(_)), "got {err:?}");
    }

    #[test]
    fn unparseable_file_with_encrypt_marker_reports_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.pdf");
        // Truncated junk that still carries a trailer /Encrypt marker.
        std::fs::write(&path, b"%PDF-1.5\ntrailer << /Encrypt 9 0 R >>\n").unwrap();

        let info = inspect_pdf(&path).unwrap();
        assert!(info.encrypted);
        assert_eq!(info.page_count, None);
        assert!(info.metadata.is_empty());
    }
}
