// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output finalization — rewrite producer metadata on the merged candidate
// and write the final artifact.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object};
use pdfweld_core::error::{Result, WeldError};
use tracing::{info, instrument, warn};

/// Producer signature stamped into every document pdfweld emits.
pub const PRODUCER_TAG: &str = "pdfweld(https://github.com/hyperpolymath/pdfweld)";

const PRODUCER_KEY: &str = "Producer";

/// Carry the merged candidate's pages unchanged into the final output,
/// rewriting the Info dictionary on the way.
///
/// Metadata policy: an existing producer entry gets this tool's signature
/// appended; otherwise the producer is set to the signature alone. Entries
/// that cannot be represented as PDF text strings were already dropped (with
/// a warning) at inspection time — what arrives here is written verbatim.
#[instrument(skip_all, fields(
    candidate = %candidate.as_ref().display(),
    destination = %destination.as_ref().display(),
))]
pub fn finalize_output(
    candidate: impl AsRef<Path>,
    source_metadata: &BTreeMap<String, String>,
    destination: impl AsRef<Path>,
) -> Result<()> {
    let candidate = candidate.as_ref();
    let mut doc = Document::load(candidate).map_err(|err| {
        WeldError::Pdf(format!(
            "failed to load merge candidate {}: {err}",
            candidate.display()
        ))
    })?;

    let mut info = Dictionary::new();
    let mut producer_seen = false;
    for (key, value) in source_metadata {
        if key.is_empty() {
            warn!("metadata entry with empty key not copied to final PDF");
            continue;
        }
        let value = if key == PRODUCER_KEY {
            producer_seen = true;
            format!("{value}; {PRODUCER_TAG}")
        } else {
            value.clone()
        };
        info.set(key.as_bytes().to_vec(), Object::string_literal(value));
    }
    if !producer_seen {
        info.set(PRODUCER_KEY, Object::string_literal(PRODUCER_TAG));
    }

    let info_id = doc.add_object(Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| WeldError::Pdf(format!("failed to serialise final PDF: {err}")))?;
    std::fs::write(destination.as_ref(), &bytes)?;

    info!(
        bytes = bytes.len(),
        producer_appended = producer_seen,
        "final output written"
    );
    Ok(())
}
