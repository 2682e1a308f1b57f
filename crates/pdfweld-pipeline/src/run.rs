// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline driver — validates the input, then runs the sequential phases
// (rasterize-all → deskew-all → OCR-all → assemble → merge → finalize),
// threading one immutable config and one explicit run-state through the
// stages. Temp artifacts die with the Workdir unless the user keeps them.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pdfweld_core::config::WeldConfig;
use pdfweld_core::error::{Result, WeldError};
use pdfweld_core::types::{DocumentInfo, InputKind};
use tracing::{debug, info, instrument, warn};

use crate::compose::{self, MergeReport};
use crate::pool::WorkerPool;
use crate::stage::ocr::PageOcrOutcome;
use crate::stage::{deskew, ocr, rasterize};
use crate::tools::{ExternalTools, detect_mime};
use crate::workdir::Workdir;

/// Mutable state accumulated across the pipeline stages.
#[derive(Debug, Default)]
struct RunState {
    info: DocumentInfo,
    images: Vec<PathBuf>,
    deskew_applied: bool,
    ocr_outcomes: Vec<PageOcrOutcome>,
    overlay_pages: usize,
    report: MergeReport,
}

/// What one successful invocation produced.
#[derive(Debug)]
pub struct RunSummary {
    pub output: PathBuf,
    pub text_output: Option<PathBuf>,
    /// Pages that produced an overlay.
    pub pages_ocr: usize,
    /// Pages in the assembled overlay document.
    pub overlay_pages: usize,
    pub report: MergeReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One configured pipeline invocation.
pub struct OcrPipeline {
    config: WeldConfig,
    tools: ExternalTools,
}

impl OcrPipeline {
    /// Validate the input path and resolve every external tool. Fails before
    /// any work begins if a required tool is absent.
    pub fn prepare(config: WeldConfig) -> Result<Self> {
        if !config.input.is_file() {
            return Err(WeldError::Input(format!(
                "{} not found",
                config.input.display()
            )));
        }
        let tools = ExternalTools::discover(config.use_pdftk)?;
        Ok(Self { config, tools })
    }

    /// Run the whole pipeline.
    #[instrument(skip_all, fields(input = %self.config.input.display()))]
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let config = &self.config;

        // -- Validation and pre-checks ---------------------------------------
        let mime = detect_mime(&self.tools.file, &config.input)?;
        info!(input = %config.input.display(), %mime, "input file type detected");
        let kind = InputKind::from_mime(&mime).ok_or_else(|| {
            WeldError::Input(format!(
                "{} is not supported (mime type {mime})",
                config.input.display()
            ))
        })?;

        let mut state = RunState::default();
        if kind.is_pdf() {
            state.info = pdfweld_document::inspect_pdf(&config.input)?;
            if config.check_text && state.info.has_text {
                return Err(WeldError::Input(format!(
                    "{} already has text and check-text mode is enabled",
                    config.input.display()
                )));
            }
            if config.check_protection && state.info.encrypted {
                return Err(WeldError::Input(format!(
                    "{} is an encrypted PDF and check-protection mode is enabled",
                    config.input.display()
                )));
            }
        }

        let (output, text_output) = self.resolve_outputs()?;
        let workdir = Workdir::create(config.keep_temps)?;
        let pool = WorkerPool::new(config.worker_budget())?;
        info!(
            run = %workdir.run_id(),
            workers = pool.workers(),
            workdir = %workdir.dir().display(),
            "pipeline starting"
        );

        // -- Phase 1: rasterize ----------------------------------------------
        state.images = rasterize::rasterize_all(
            &self.tools,
            &pool,
            config,
            &workdir,
            kind,
            state.info.page_count,
        )?;

        // -- Phase 2: deskew (optional) --------------------------------------
        if let Some(threshold) = &config.deskew_threshold {
            deskew::deskew_all(&self.tools, &pool, threshold, &state.images);
            state.deskew_applied = true;
        }

        // -- Phase 3: OCR ------------------------------------------------------
        state.ocr_outcomes = ocr::ocr_all(&self.tools, &pool, config, &workdir, &state.images)?;

        // -- Assembly ----------------------------------------------------------
        let overlays = workdir.list_page_overlays()?;
        state.overlay_pages =
            pdfweld_document::assemble_overlays(&overlays, workdir.assembled_overlay())?;

        // -- Text sidecar ------------------------------------------------------
        if config.text_sidecar {
            write_text_sidecar(&workdir, &text_output)?;
        }

        // -- Merge + finalize --------------------------------------------------
        compose::build_final(
            &self.tools,
            config,
            &workdir,
            kind,
            &state.info,
            state.deskew_applied,
            &state.images,
            &mut state.report,
        )?;

        pdfweld_document::finalize_output(
            &workdir.merge_candidate(),
            &state.info.metadata,
            &output,
        )?;

        let pages_ocr = state
            .ocr_outcomes
            .iter()
            .filter(|o| o.overlay.is_some())
            .count();
        let finished_at = Utc::now();
        info!(
            output = %output.display(),
            pages_ocr,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "output file created"
        );

        Ok(RunSummary {
            output,
            text_output: config.text_sidecar.then_some(text_output),
            pages_ocr,
            overlay_pages: state.overlay_pages,
            report: state.report,
            started_at,
            finished_at,
        })
    }

    fn resolve_outputs(&self) -> Result<(PathBuf, PathBuf)> {
        resolve_outputs(&self.config)
    }
}

/// Resolve the final artifact paths, honoring safe mode and clearing stale
/// outputs from earlier runs.
fn resolve_outputs(config: &WeldConfig) -> Result<(PathBuf, PathBuf)> {
    let output = match &config.output {
        Some(path) => path.clone(),
        None => {
            let stem = config
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string());
            config.input.with_file_name(format!("{stem}-OCR.pdf"))
        }
    };
    let text_output = PathBuf::from(format!("{}.txt", output.display()));
    debug!(
        output = %output.display(),
        text_output = %text_output.display(),
        "output paths resolved"
    );

    if config.safe_mode {
        if output.exists() {
            return Err(WeldError::Input(format!(
                "{} already exists and safe mode is enabled",
                output.display()
            )));
        }
        if config.text_sidecar && text_output.exists() {
            return Err(WeldError::Input(format!(
                "{} already exists and safe mode is enabled",
                text_output.display()
            )));
        }
    } else {
        best_effort_remove(&output);
        if config.text_sidecar {
            best_effort_remove(&text_output);
        }
    }
    Ok((output, text_output))
}

/// Concatenate the per-page text sidecars, in page order, into one file.
fn write_text_sidecar(workdir: &Workdir, destination: &std::path::Path) -> Result<()> {
    let texts = workdir.list_page_texts()?;
    if texts.is_empty() {
        warn!("no per-page text was produced; writing an empty text file");
    }
    let mut combined = Vec::new();
    for text in &texts {
        combined.extend(std::fs::read(text)?);
    }
    std::fs::write(destination, combined)?;
    info!(pages = texts.len(), destination = %destination.display(), "created final text file");
    Ok(())
}

fn best_effort_remove(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), %err, "could not remove stale output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_derived_from_input_stem() {
        let config = WeldConfig::new("/data/scans/contract.pdf");
        let (output, text_output) = resolve_outputs(&config).unwrap();
        assert_eq!(output, PathBuf::from("/data/scans/contract-OCR.pdf"));
        assert_eq!(
            text_output,
            PathBuf::from("/data/scans/contract-OCR.pdf.txt")
        );
    }

    #[test]
    fn explicit_output_wins() {
        let mut config = WeldConfig::new("/data/in.pdf");
        config.output = Some(PathBuf::from("/elsewhere/searchable.pdf"));
        let (output, _) = resolve_outputs(&config).unwrap();
        assert_eq!(output, PathBuf::from("/elsewhere/searchable.pdf"));
    }

    #[test]
    fn safe_mode_refuses_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("scan-OCR.pdf");
        std::fs::write(&existing, b"previous run").unwrap();

        let mut config = WeldConfig::new(dir.path().join("scan.pdf"));
        config.safe_mode = true;
        let err = resolve_outputs(&config).unwrap_err();
        assert!(matches!(err, WeldError::Input(_)), "got {err:?}");
        // Safe mode must not touch the existing file either.
        assert!(existing.exists());
    }

    #[test]
    fn stale_outputs_removed_without_safe_mode() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("scan-OCR.pdf");
        std::fs::write(&stale, b"previous run").unwrap();

        let config = WeldConfig::new(dir.path().join("scan.pdf"));
        resolve_outputs(&config).unwrap();
        assert!(!stale.exists(), "stale output survived");
    }

    #[test]
    fn text_sidecar_collision_only_checked_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("scan-OCR.pdf.txt");
        std::fs::write(&text, b"previous text").unwrap();

        let mut config = WeldConfig::new(dir.path().join("scan.pdf"));
        config.safe_mode = true;
        // Without --text-sidecar the stale text file is irrelevant.
        resolve_outputs(&config).unwrap();

        config.text_sidecar = true;
        let err = resolve_outputs(&config).unwrap_err();
        assert!(matches!(err, WeldError::Input(_)), "got {err:?}");
    }
}
