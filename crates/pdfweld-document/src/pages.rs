// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared lopdf object-graph helpers: building empty documents, cloning pages
// across documents, and resolving inheritable page attributes.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfweld_core::error::{Result, WeldError};
use tracing::warn;

/// How far up the /Parent chain inheritable attributes are searched.
const INHERIT_MAX_DEPTH: usize = 32;

/// Create an empty document with a valid catalog and page tree.
pub(crate) fn blank_document() -> Document {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(0)),
        ("Kids", Object::Array(Vec::new())),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc
}

/// Clones pages (and everything they transitively reference) from one
/// document into another.
///
/// Shared objects are cloned once and re-referenced afterwards, so cloning
/// several pages that share fonts does not duplicate the font programs.
/// The /Parent back-reference is skipped during cloning and re-pointed at
/// the target's page tree.
pub(crate) struct PageImporter<'a> {
    source: &'a Document,
    imported: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageImporter<'a> {
    pub(crate) fn new(source: &'a Document) -> Self {
        Self {
            source,
            imported: HashMap::new(),
        }
    }

    /// Clone `page_id` from the source into `target` and append it to the
    /// target's page tree. Returns the page's object id in the target.
    pub(crate) fn append_page(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
    ) -> Result<ObjectId> {
        let page_object = self.source.get_object(page_id).map_err(|err| {
            WeldError::Pdf(format!("cannot read page object {page_id:?}: {err}"))
        })?;

        let cloned = self.clone_value(target, page_object)?;
        let new_page_id = target.add_object(cloned);

        let pages_id = page_tree_root(target)?;

        if let Ok(Object::Dictionary(pages_dict)) = target.get_object_mut(pages_id) {
            if let Ok(Object::Array(kids)) = pages_dict.get_mut(b"Kids") {
                kids.push(Object::Reference(new_page_id));
            }
            if let Ok(Object::Integer(count)) = pages_dict.get_mut(b"Count") {
                *count += 1;
            }
        }

        if let Ok(Object::Dictionary(page_dict)) = target.get_object_mut(new_page_id) {
            page_dict.set("Type", Object::Name(b"Page".to_vec()));
            page_dict.set("Parent", Object::Reference(pages_id));
        }

        Ok(new_page_id)
    }

    /// Deep-clone a single value from the source document into `target`.
    ///
    /// References are followed and cloned exactly once; cycles are broken by
    /// reserving the target id before descending.
    pub(crate) fn clone_value(&mut self, target: &mut Document, value: &Object) -> Result<Object> {
        match value {
            Object::Dictionary(dict) => {
                Ok(Object::Dictionary(self.clone_dictionary(target, dict)?))
            }
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_value(target, item)?);
                }
                Ok(Object::Array(cloned))
            }
            Object::Reference(ref_id) => {
                if let Some(already) = self.imported.get(ref_id) {
                    return Ok(Object::Reference(*already));
                }
                match self.source.get_object(*ref_id) {
                    Ok(referenced) => {
                        // Reserve the id first so self-referential graphs
                        // terminate.
                        let new_id = target.new_object_id();
                        self.imported.insert(*ref_id, new_id);
                        let cloned = self.clone_value(target, referenced)?;
                        target.objects.insert(new_id, cloned);
                        Ok(Object::Reference(new_id))
                    }
                    Err(err) => {
                        warn!(?ref_id, %err, "cannot resolve reference, using Null");
                        Ok(Object::Null)
                    }
                }
            }
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict)?;
                Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
            }
            other => Ok(other.clone()),
        }
    }

    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            // /Parent is patched by append_page; cloning it would drag the
            // whole source page tree across.
            if key == b"Parent" {
                continue;
            }
            cloned.set(key.clone(), self.clone_value(target, value)?);
        }
        Ok(cloned)
    }
}

/// Resolve the /Pages node referenced from the document catalog.
pub(crate) fn page_tree_root(doc: &Document) -> Result<ObjectId> {
    let catalog = doc
        .catalog()
        .map_err(|err| WeldError::Pdf(format!("document has no catalog: {err}")))?;
    match catalog.get(b"Pages") {
        Ok(Object::Reference(id)) => Ok(*id),
        Ok(_) => Err(WeldError::Pdf("/Pages is not a reference".to_string())),
        Err(err) => Err(WeldError::Pdf(format!("catalog has no /Pages: {err}"))),
    }
}

/// Follow a reference to its object; non-references are returned unchanged.
pub(crate) fn deref<'a>(doc: &'a Document, value: &'a Object) -> &'a Object {
    match value {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(value),
        other => other,
    }
}

fn as_number(value: &Object) -> Option<f32> {
    match value {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Look up an inheritable page attribute, walking the /Parent chain.
fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..INHERIT_MAX_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(deref(doc, value));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
    None
}

/// The page's MediaBox as `[x0, y0, x1, y1]`, honoring inheritance.
/// Falls back to US Letter when the document omits it entirely.
pub(crate) fn page_media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4]> {
    let Some(value) = inherited_attribute(doc, page_id, b"MediaBox") else {
        warn!(?page_id, "page has no MediaBox; assuming 612x792");
        return Ok([0.0, 0.0, 612.0, 792.0]);
    };
    let items = value
        .as_array()
        .map_err(|err| WeldError::Pdf(format!("MediaBox is not an array: {err}")))?;
    if items.len() != 4 {
        return Err(WeldError::Pdf(format!(
            "MediaBox has {} entries, expected 4",
            items.len()
        )));
    }
    let mut media_box = [0.0f32; 4];
    for (slot, item) in media_box.iter_mut().zip(items) {
        *slot = as_number(deref(doc, item)).ok_or_else(|| {
            WeldError::Pdf("MediaBox entry is not a number".to_string())
        })?;
    }
    Ok(media_box)
}

/// The page's resource dictionary as an owned copy, honoring inheritance.
/// A page with no resources anywhere yields an empty dictionary.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => Ok(dict.clone()),
        Some(other) => Err(WeldError::Pdf(format!(
            "page /Resources is not a dictionary: {other:?}"
        ))),
        None => Ok(Dictionary::new()),
    }
}

/// Decode the page's (concatenated) content streams into operations.
pub(crate) fn decode_page_content(doc: &Document, page_id: ObjectId) -> Result<Content> {
    let raw = doc
        .get_page_content(page_id)
        .map_err(|err| WeldError::Pdf(format!("cannot read page content: {err}")))?;
    Content::decode(&raw)
        .map_err(|err| WeldError::Pdf(format!("cannot decode page content: {err}")))
}

/// Replace the page's /Contents with a single freshly-encoded stream.
pub(crate) fn set_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: &Content,
) -> Result<()> {
    let encoded = content
        .encode()
        .map_err(|err| WeldError::Pdf(format!("cannot encode page content: {err}")))?;
    let stream_id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), encoded)));
    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| WeldError::Pdf(format!("page {page_id:?} is not a dictionary: {err}")))?;
    page_dict.set("Contents", Object::Reference(stream_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;

    fn single_page_doc(marker: &str) -> Document {
        let mut doc = blank_document();
        let pages_id = page_tree_root(&doc).unwrap();

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        marker.as_bytes().to_vec(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        )));

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
            ("Contents", Object::Reference(content_id)),
        ]);
        let page_id = doc.add_object(page);

        if let Ok(Object::Dictionary(pages)) = doc.get_object_mut(pages_id) {
            if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
                kids.push(Object::Reference(page_id));
            }
            if let Ok(Object::Integer(count)) = pages.get_mut(b"Count") {
                *count += 1;
            }
        }
        doc
    }

    #[test]
    fn blank_document_has_valid_empty_page_tree() {
        let doc = blank_document();
        assert_eq!(doc.get_pages().len(), 0);
        assert!(page_tree_root(&doc).is_ok());
    }

    #[test]
    fn append_page_carries_content_across() {
        let source = single_page_doc("hello");
        let mut target = blank_document();

        let source_page = *source.get_pages().values().next().unwrap();
        let mut importer = PageImporter::new(&source);
        let new_page = importer.append_page(&mut target, source_page).unwrap();

        assert_eq!(target.get_pages().len(), 1);
        let content = decode_page_content(&target, new_page).unwrap();
        let has_marker = content.operations.iter().any(|op| {
            op.operator == "Tj"
                && matches!(op.operands.first(), Some(Object::String(s, _)) if s == b"hello")
        });
        assert!(has_marker, "cloned page lost its content stream");
    }

    #[test]
    fn shared_objects_cloned_once() {
        let source = single_page_doc("shared");
        let source_page = *source.get_pages().values().next().unwrap();

        let mut target = blank_document();
        let mut importer = PageImporter::new(&source);
        importer.append_page(&mut target, source_page).unwrap();
        let after_first = target.objects.len();
        importer.append_page(&mut target, source_page).unwrap();

        // Second append reuses every transitively-referenced object; only the
        // page dictionary itself is added again.
        assert_eq!(target.objects.len(), after_first + 1);
    }

    #[test]
    fn media_box_inherited_from_parent() {
        let mut doc = single_page_doc("x");
        let pages_id = page_tree_root(&doc).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        // Move the MediaBox from the page to the /Pages node.
        if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
            page.remove(b"MediaBox");
        }
        if let Ok(Object::Dictionary(pages)) = doc.get_object_mut(pages_id) {
            pages.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ]),
            );
        }

        let media_box = page_media_box(&doc, page_id).unwrap();
        assert_eq!(media_box, [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn set_page_content_replaces_stream() {
        let mut doc = single_page_doc("before");
        let page_id = *doc.get_pages().values().next().unwrap();

        let replacement = Content {
            operations: vec![Operation::new(
                "Tj",
                vec![Object::String(b"after".to_vec(), lopdf::StringFormat::Literal)],
            )],
        };
        set_page_content(&mut doc, page_id, &replacement).unwrap();

        let content = decode_page_content(&doc, page_id).unwrap();
        assert_eq!(content.operations.len(), 1);
        assert!(matches!(
            content.operations[0].operands.first(),
            Some(Object::String(s, _)) if s == b"after"
        ));
    }
}
