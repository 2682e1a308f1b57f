// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overlay assembly — concatenate the per-page text overlays into one
// multi-page overlay document.
//
// The input list must already be sorted by filename; the rasterizer's
// zero-padded page numbering makes lexicographic order equal page order,
// and that naming contract is the only ordering mechanism between phases.

use std::path::{Path, PathBuf};

use lopdf::Document;
use pdfweld_core::error::{Result, WeldError};
use tracing::{debug, info, instrument};

use crate::pages::{PageImporter, blank_document};

/// Concatenate per-page overlay documents into `destination`.
///
/// Exactly one overlay is copied as-is (no merge cost). Returns the number
/// of pages in the assembled document.
///
/// # Errors
///
/// Zero overlays is fatal: it means OCR produced nothing at all, and
/// continuing would silently emit a document with no text layer.
#[instrument(skip_all, fields(overlays = overlays.len(), destination = %destination.as_ref().display()))]
pub fn assemble_overlays(overlays: &[PathBuf], destination: impl AsRef<Path>) -> Result<usize> {
    let destination = destination.as_ref();

    if overlays.is_empty() {
        return Err(WeldError::Pipeline(
            "no OCR page overlays were produced; aborting instead of emitting an empty text layer"
                .to_string(),
        ));
    }

    if overlays.len() == 1 {
        std::fs::copy(&overlays[0], destination)?;
        debug!("single overlay copied directly");
        return Ok(1);
    }

    let mut assembled = blank_document();
    let mut total_pages = 0usize;

    for overlay_path in overlays {
        let source = Document::load(overlay_path).map_err(|err| {
            WeldError::Pdf(format!(
                "failed to load page overlay {}: {err}",
                overlay_path.display()
            ))
        })?;
        let mut importer = PageImporter::new(&source);
        // Defensively iterate in page order; overlays are one page each in
        // normal operation.
        for (_, page_id) in source.get_pages() {
            importer.append_page(&mut assembled, page_id)?;
            total_pages += 1;
        }
    }

    assembled.compress();
    let mut bytes = Vec::new();
    assembled.save_to(&mut bytes).map_err(|err| {
        WeldError::Pdf(format!("failed to serialise assembled overlay: {err}"))
    })?;
    std::fs::write(destination, &bytes)?;

    info!(pages = total_pages, "overlay document assembled");
    Ok(total_pages)
}
