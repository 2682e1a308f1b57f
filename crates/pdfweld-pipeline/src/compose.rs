// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Final composition — merge the assembled text overlay onto the source
// document, with a layered fallback strategy.
//
// The state machine: DirectMerge → (failure) RepairRetry → (failure) FATAL.
// The rebuild path is a parallel entry: when the original content cannot be
// trusted (encrypted, not a PDF, deskewed, or rebuild forced) the source is
// re-encoded from the page images first and merged without a repair step —
// a freshly generated document has nothing to repair.
//
// Every attempt is recorded in the MergeReport, and candidate-file presence
// is kept as a secondary integrity check on top of the structured results.

use std::path::Path;

use pdfweld_core::config::WeldConfig;
use pdfweld_core::error::{Result, WeldError};
use pdfweld_core::types::{DocumentInfo, InputKind};
use tracing::{debug, info, instrument, warn};

use crate::tools::{ExternalTools, run_logged};
use crate::workdir::Workdir;

/// Which merge attempts ran, and how the candidate came to be.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReport {
    /// The final PDF was rebuilt from page images.
    pub rebuilt: bool,
    /// Number of direct-merge attempts (1 normally, 2 after a repair).
    pub direct_attempts: u32,
    /// The PostScript round-trip repair ran.
    pub repair_attempted: bool,
}

/// Whether the original document must be discarded and rebuilt from the
/// rasterized page images.
pub fn needs_rebuild(
    kind: InputKind,
    info: &DocumentInfo,
    deskew_applied: bool,
    force_rebuild: bool,
) -> bool {
    info.encrypted || !kind.is_pdf() || deskew_applied || force_rebuild
}

/// Drive the merge state machine until a candidate exists or every fallback
/// is exhausted.
///
/// The report is written through even on failure so callers (and tests) can
/// see which attempts ran.
#[instrument(skip_all, fields(rebuild = needs_rebuild(kind, info, deskew_applied, config.force_rebuild)))]
pub fn build_final(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
    kind: InputKind,
    info: &DocumentInfo,
    deskew_applied: bool,
    images: &[std::path::PathBuf],
    report: &mut MergeReport,
) -> Result<()> {
    let candidate = workdir.merge_candidate();

    if needs_rebuild(kind, info, deskew_applied, config.force_rebuild) {
        warn!(
            "metadata is wiped from the final PDF (input is not an unprotected PDF, \
             rebuild was forced, or deskew modified the page images)"
        );
        report.rebuilt = true;
        rebuild_source(tools, config, workdir, images);

        report.direct_attempts += 1;
        if let Err(err) = direct_merge(tools, config, workdir, &workdir.rebuilt_input(), "rebuild")
        {
            warn!(%err, "merge against rebuilt document failed");
        }
    } else {
        report.direct_attempts += 1;
        let first = direct_merge(tools, config, workdir, &config.input, "merge");
        let candidate_missing = !candidate.is_file();
        if first.is_err() || candidate_missing {
            if let Err(err) = &first {
                warn!(%err, "direct merge failed; trying to fix source PDF");
            } else {
                warn!("direct merge produced no output; trying to fix source PDF");
            }
            report.repair_attempted = true;
            match repair_input(tools, workdir, &config.input) {
                Ok(repaired) => {
                    report.direct_attempts += 1;
                    if let Err(err) =
                        direct_merge(tools, config, workdir, &repaired, "merge-fixed")
                    {
                        warn!(%err, "merge against repaired document failed");
                    }
                }
                Err(err) => warn!(%err, "source PDF repair failed"),
            }
        }
    }

    // The load-bearing check: no candidate file, no output.
    if !candidate.is_file() {
        return Err(WeldError::Pipeline(
            "output file could not be created after all merge attempts".to_string(),
        ));
    }
    info!(?report, "merge candidate ready");
    Ok(())
}

/// One direct-merge attempt: overlay the assembled text layer onto `base`.
fn direct_merge(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
    base: &Path,
    tag: &str,
) -> Result<()> {
    let overlay = workdir.assembled_overlay();
    let candidate = workdir.merge_candidate();

    if config.use_pdftk {
        let Some(pdftk) = &tools.pdftk else {
            return Err(WeldError::ToolMissing("pdftk".to_string()));
        };
        debug!(tag, "merging with OCR using pdftk");
        let log = workdir.merge_err_log(tag);
        let run = run_logged(
            pdftk,
            [
                base.display().to_string(),
                "multibackground".to_string(),
                overlay.display().to_string(),
                "output".to_string(),
                candidate.display().to_string(),
            ],
            Some(&log),
        )?;
        if !run.success() {
            return Err(WeldError::Merge(format!(
                "pdftk exited with {:?}, see {}",
                run.exit_code,
                log.display()
            )));
        }
        Ok(())
    } else {
        debug!(tag, "merging with OCR");
        pdfweld_document::overlay_onto(base, &overlay, &candidate)
    }
}

/// Re-encode the sorted page images into a fresh PDF with the configured
/// compression preset. Best-effort: a failure here surfaces as a missing
/// candidate after the follow-up merge.
fn rebuild_source(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
    images: &[std::path::PathBuf],
) {
    info!("rebuilding PDF from images");
    let mut args: Vec<String> = images.iter().map(|p| p.display().to_string()).collect();
    args.extend(config.rebuild_preset.convert_args());
    args.push(workdir.rebuilt_input().display().to_string());

    match run_logged(&tools.convert, &args, None) {
        Ok(run) if run.success() => {}
        Ok(run) => warn!(exit_code = ?run.exit_code, "convert failed while rebuilding from images"),
        Err(err) => warn!(%err, "convert could not be run for the rebuild"),
    }
}

/// PostScript round-trip: pdf2ps then ps2pdf, normalizing malformed PDF
/// structures. Returns the repaired document path.
fn repair_input(tools: &ExternalTools, workdir: &Workdir, input: &Path) -> Result<std::path::PathBuf> {
    let (Some(pdf2ps), Some(ps2pdf)) = (&tools.pdf2ps, &tools.ps2pdf) else {
        return Err(WeldError::ToolMissing(
            "pdf2ps/ps2pdf (ghostscript)".to_string(),
        ));
    };

    let intermediate = workdir.repair_ps();
    let repaired = workdir.repaired_input();

    let run = run_logged(
        pdf2ps,
        [input.display().to_string(), intermediate.display().to_string()],
        Some(&workdir.repair_err_log("pdf2ps")),
    )?;
    if !run.success() || !intermediate.is_file() {
        return Err(WeldError::Tool(format!(
            "pdf2ps failed with {:?}",
            run.exit_code
        )));
    }

    let run = run_logged(
        ps2pdf,
        [
            intermediate.display().to_string(),
            repaired.display().to_string(),
        ],
        Some(&workdir.repair_err_log("ps2pdf")),
    )?;
    if !run.success() || !repaired.is_file() {
        return Err(WeldError::Tool(format!(
            "ps2pdf failed with {:?}",
            run.exit_code
        )));
    }

    info!(repaired = %repaired.display(), "source PDF repaired");
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfweld_core::config::WeldConfig;
    use std::path::PathBuf;

    fn dummy_tools() -> ExternalTools {
        // Paths never spawned by the programmatic-merge tests.
        ExternalTools {
            tesseract: PathBuf::from("/nonexistent/tesseract"),
            convert: PathBuf::from("/nonexistent/convert"),
            mogrify: PathBuf::from("/nonexistent/mogrify"),
            file: PathBuf::from("/nonexistent/file"),
            pdftoppm: PathBuf::from("/nonexistent/pdftoppm"),
            pdf2ps: None,
            ps2pdf: None,
            pdftk: None,
        }
    }

    fn plain_info() -> DocumentInfo {
        DocumentInfo::default()
    }

    #[test]
    fn rebuild_triggers() {
        let mut encrypted = plain_info();
        encrypted.encrypted = true;
        encrypted.page_count = Some(3);

        // Encrypted input forces a rebuild even with deskew and the force
        // flag both off.
        assert!(needs_rebuild(InputKind::Pdf, &encrypted, false, false));

        assert!(!needs_rebuild(InputKind::Pdf, &plain_info(), false, false));
        assert!(needs_rebuild(InputKind::Jpeg, &plain_info(), false, false));
        assert!(needs_rebuild(InputKind::Pdf, &plain_info(), true, false));
        assert!(needs_rebuild(InputKind::Pdf, &plain_info(), false, true));
    }

    /// Build a minimal one-page PDF on disk (enough for lopdf to load).
    fn write_tiny_pdf(path: &Path, marker: &str) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
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
        let page_id = doc.add_object(Dictionary::from_iter(vec![
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
        ]));
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(1)),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn direct_merge_success_needs_no_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = Workdir::create_in(dir.path(), true).unwrap();
        let input = dir.path().join("input.pdf");
        write_tiny_pdf(&input, "original");
        write_tiny_pdf(&workdir.assembled_overlay(), "ocr layer");

        let config = WeldConfig::new(&input);
        let mut report = MergeReport::default();
        build_final(
            &dummy_tools(),
            &config,
            &workdir,
            InputKind::Pdf,
            &plain_info(),
            false,
            &[],
            &mut report,
        )
        .unwrap();

        assert!(workdir.merge_candidate().is_file());
        assert_eq!(report.direct_attempts, 1);
        assert!(!report.repair_attempted);
        assert!(!report.rebuilt);
    }

    #[test]
    fn failed_merge_without_ghostscript_attempts_repair_once_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = Workdir::create_in(dir.path(), true).unwrap();
        let input = dir.path().join("input.pdf");
        std::fs::write(&input, b"broken beyond parsing").unwrap();
        write_tiny_pdf(&workdir.assembled_overlay(), "ocr layer");

        let config = WeldConfig::new(&input);
        let mut report = MergeReport::default();
        let err = build_final(
            &dummy_tools(),
            &config,
            &workdir,
            InputKind::Pdf,
            &plain_info(),
            false,
            &[],
            &mut report,
        )
        .unwrap_err();

        assert!(matches!(err, WeldError::Pipeline(_)), "got {err:?}");
        assert!(report.repair_attempted, "repair was never attempted");
        // Repair could not run (no ghostscript), so only the first direct
        // merge was attempted.
        assert_eq!(report.direct_attempts, 1);
        assert!(
            !workdir.merge_candidate().exists(),
            "fatal merge must not leave a candidate behind"
        );
    }

    #[cfg(unix)]
    #[test]
    fn repair_runs_exactly_once_and_failed_retry_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let workdir = Workdir::create_in(dir.path(), true).unwrap();
        let input = dir.path().join("input.pdf");
        std::fs::write(&input, b"broken beyond parsing").unwrap();
        write_tiny_pdf(&workdir.assembled_overlay(), "ocr layer");

        // Fake ghostscript: copies its (still broken) input to its output,
        // so the repair "succeeds" but the retried merge fails again.
        let fake_gs = dir.path().join("fake-gs.sh");
        std::fs::write(&fake_gs, "#!/bin/sh\ncp \"$1\" \"$2\"\n").unwrap();
        let mut perms = std::fs::metadata(&fake_gs).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&fake_gs, perms).unwrap();

        let mut tools = dummy_tools();
        tools.pdf2ps = Some(fake_gs.clone());
        tools.ps2pdf = Some(fake_gs);

        let config = WeldConfig::new(&input);
        let mut report = MergeReport::default();
        let err = build_final(
            &tools,
            &config,
            &workdir,
            InputKind::Pdf,
            &plain_info(),
            false,
            &[],
            &mut report,
        )
        .unwrap_err();

        assert!(matches!(err, WeldError::Pipeline(_)), "got {err:?}");
        assert!(report.repair_attempted);
        // Exactly one repair, exactly one retry.
        assert_eq!(report.direct_attempts, 2);
        assert!(!workdir.merge_candidate().exists());
    }
}
