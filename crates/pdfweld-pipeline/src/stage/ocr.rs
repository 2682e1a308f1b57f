// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR phase — run tesseract per page image and post-process each produced
// one-page PDF into a text-only overlay.
//
// Tesseract writes `{stem}.pdf` (embedded image + invisible text) and
// `{stem}.txt` next to the workdir prefix; the post-processing step strips
// the embedded image so only the positioned text layer remains. A page whose
// OCR fails simply has no overlay — the hole is counted here and reported,
// and assembly decides whether anything is left to work with.

use std::path::PathBuf;
use std::time::Duration;

use pdfweld_core::config::WeldConfig;
use pdfweld_core::error::{Result, WeldError};
use tracing::{info, instrument, warn};

use crate::pool::WorkerPool;
use crate::tools::{ExternalTools, run_logged};
use crate::workdir::Workdir;

/// Cadence of the "still working" log line during long OCR batches.
const PROGRESS_TICK: Duration = Duration::from_secs(5);

/// Why one page produced no overlay.
#[derive(Debug)]
pub enum OcrFailure {
    /// The tesseract process failed to run or exited non-zero.
    Tool(String),
    /// Tesseract exited successfully but the expected output file is absent.
    MissingOutput(String),
    /// Overlay post-processing failed.
    Strip(String),
    /// Post-processing hit an internal-consistency fault (e.g. multi-page
    /// OCR output). This one aborts the whole pipeline.
    Internal(String),
}

/// Per-page OCR result.
#[derive(Debug)]
pub struct PageOcrOutcome {
    pub image: PathBuf,
    /// The stripped text-only overlay, when OCR succeeded.
    pub overlay: Option<PathBuf>,
    /// The plain-text sidecar, when tesseract produced one.
    pub sidecar: Option<PathBuf>,
    pub failure: Option<OcrFailure>,
}

/// OCR every page image, reporting liveness every few seconds.
///
/// # Errors
///
/// Only internal-consistency faults abort the batch; ordinary per-page
/// failures are logged and surface as holes in the outcome list.
#[instrument(skip_all, fields(images = images.len()))]
pub fn ocr_all(
    tools: &ExternalTools,
    pool: &WorkerPool,
    config: &WeldConfig,
    workdir: &Workdir,
    images: &[PathBuf],
) -> Result<Vec<PageOcrOutcome>> {
    info!("starting OCR");

    let outcomes = pool.run_all_with_progress(
        images.to_vec(),
        |image| ocr_page(tools, config, workdir, image),
        PROGRESS_TICK,
        |done, total| info!("waiting for OCR to complete: {done}/{total} pages done"),
    );

    let mut produced = 0usize;
    for outcome in &outcomes {
        match &outcome.failure {
            None => produced += 1,
            Some(OcrFailure::Internal(detail)) => {
                return Err(WeldError::Internal(detail.clone()));
            }
            Some(failure) => {
                warn!(image = %outcome.image.display(), ?failure, "page produced no overlay");
            }
        }
    }

    if produced < images.len() {
        warn!(
            produced,
            expected = images.len(),
            "some pages are missing from the text layer"
        );
    }
    info!(produced, "OCR completed");
    Ok(outcomes)
}

fn ocr_page(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
    image: PathBuf,
) -> PageOcrOutcome {
    let output_base = workdir.ocr_output_base(&image);
    let stem = output_base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let log = workdir.ocr_err_log(&stem);

    let args = [
        "-l".to_string(),
        config.languages.clone(),
        "-c".to_string(),
        "tessedit_create_pdf=1".to_string(),
        "-c".to_string(),
        "tessedit_create_txt=1".to_string(),
        "-c".to_string(),
        format!("tessedit_pageseg_mode={}", config.page_seg_mode),
        image.display().to_string(),
        output_base.display().to_string(),
    ];

    let mut outcome = PageOcrOutcome {
        image,
        overlay: None,
        sidecar: None,
        failure: None,
    };

    match run_logged(&tools.tesseract, &args, Some(&log)) {
        Ok(run) if run.success() => {}
        Ok(run) => {
            outcome.failure = Some(OcrFailure::Tool(format!(
                "tesseract exited with {:?}, see {}",
                run.exit_code,
                log.display()
            )));
            return outcome;
        }
        Err(err) => {
            outcome.failure = Some(OcrFailure::Tool(err.to_string()));
            return outcome;
        }
    }

    let overlay_path = output_base.with_extension("pdf");
    if !overlay_path.is_file() {
        // Secondary integrity check: a clean exit without the promised file
        // still counts as a failed page.
        outcome.failure = Some(OcrFailure::MissingOutput(format!(
            "{} was not produced",
            overlay_path.display()
        )));
        return outcome;
    }

    match pdfweld_document::strip_embedded_image(&overlay_path) {
        Ok(()) => outcome.overlay = Some(overlay_path),
        Err(err @ WeldError::Internal(_)) => {
            outcome.failure = Some(OcrFailure::Internal(err.to_string()));
            return outcome;
        }
        Err(err) => {
            outcome.failure = Some(OcrFailure::Strip(err.to_string()));
            return outcome;
        }
    }

    let sidecar = output_base.with_extension("txt");
    if sidecar.is_file() {
        outcome.sidecar = Some(sidecar);
    }
    outcome
}
