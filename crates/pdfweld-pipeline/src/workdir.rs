// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Temporary artifact management for one pipeline run.
//
// Every artifact name carries the run's correlation token, so concurrent
// invocations can share one temp directory and cleanup is a single
// prefix-matched sweep. Page-numbered artifacts are zero-padded by their
// producers; the sorted listings below are the ordering contract between
// phases — lexicographic order IS page order.

use std::path::{Path, PathBuf};

use pdfweld_core::error::Result;
use pdfweld_core::types::{PageRange, RunId};
use tracing::{debug, info, instrument, warn};

/// Extension used for rasterized page images. JPEG keeps temp space sane on
/// documents with many pages.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Handle to a run's temp artifacts. Dropping it removes every file carrying
/// the run token unless `keep` was requested.
#[derive(Debug)]
pub struct Workdir {
    dir: PathBuf,
    run_id: RunId,
    keep: bool,
}

impl Workdir {
    /// Create a workdir in the system temp directory.
    pub fn create(keep: bool) -> Result<Self> {
        Self::create_in(std::env::temp_dir(), keep)
    }

    /// Create a workdir rooted at an explicit directory (used by tests).
    #[instrument(skip_all)]
    pub fn create_in(dir: impl Into<PathBuf>, keep: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let run_id = RunId::new();
        debug!(dir = %dir.display(), run = %run_id, "workdir ready");
        Ok(Self { dir, run_id, keep })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The naming prefix shared by all page-numbered artifacts.
    pub fn prefix(&self) -> String {
        self.run_id.to_string()
    }

    // -- Artifact paths -------------------------------------------------------

    /// Root path handed to pdftoppm; it appends `-NNN.jpg` per page.
    pub fn image_root(&self) -> PathBuf {
        self.dir.join(self.prefix())
    }

    /// Output pattern for `convert` when the input is a single image file.
    pub fn image_scene_pattern(&self) -> PathBuf {
        self.dir
            .join(format!("{}-%09d.{IMAGE_EXTENSION}", self.prefix()))
    }

    /// Base path (no extension) for one page's OCR outputs.
    pub fn ocr_output_base(&self, image: &Path) -> PathBuf {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.prefix());
        self.dir.join(stem)
    }

    /// The assembled multi-page overlay document.
    pub fn assembled_overlay(&self) -> PathBuf {
        self.dir.join(format!("{}-ocr.pdf", self.prefix()))
    }

    /// The merge candidate inspected by the fallback chain.
    pub fn merge_candidate(&self) -> PathBuf {
        self.dir.join(format!("{}-OUTPUT.pdf", self.prefix()))
    }

    /// The document rebuilt from page images (rebuild path).
    pub fn rebuilt_input(&self) -> PathBuf {
        self.dir
            .join(format!("{}-input_unprotected.pdf", self.prefix()))
    }

    /// PostScript intermediate of the repair round-trip.
    pub fn repair_ps(&self) -> PathBuf {
        self.dir.join(format!("{}-fixPDF.ps", self.prefix()))
    }

    /// Repaired PDF produced by the repair round-trip.
    pub fn repaired_input(&self) -> PathBuf {
        self.dir.join(format!("{}-fixPDF.pdf", self.prefix()))
    }

    // -- Error log paths ------------------------------------------------------

    pub fn rasterize_err_log(&self, range: Option<PageRange>) -> PathBuf {
        let (first, last) = match range {
            Some(range) => (range.start, range.end),
            None => (0, 0),
        };
        self.dir
            .join(format!("pdftoppm_err_{}-{first}-{last}.log", self.prefix()))
    }

    pub fn ocr_err_log(&self, image_stem: &str) -> PathBuf {
        self.dir.join(format!("tess_err_{image_stem}.log"))
    }

    pub fn merge_err_log(&self, tag: &str) -> PathBuf {
        self.dir
            .join(format!("err_multiback-{}-{tag}.log", self.prefix()))
    }

    pub fn repair_err_log(&self, tool: &str) -> PathBuf {
        self.dir.join(format!("err_{tool}-{}.log", self.prefix()))
    }

    // -- Artifact listings ----------------------------------------------------

    /// Rasterized page images, sorted so page order equals list order.
    pub fn list_page_images(&self) -> Result<Vec<PathBuf>> {
        self.list_sorted(IMAGE_EXTENSION, &[])
    }

    /// Per-page OCR overlays, sorted; reserved run-level documents are
    /// excluded.
    pub fn list_page_overlays(&self) -> Result<Vec<PathBuf>> {
        let reserved = [
            self.assembled_overlay(),
            self.merge_candidate(),
            self.rebuilt_input(),
            self.repaired_input(),
        ];
        self.list_sorted("pdf", &reserved)
    }

    /// Per-page OCR text sidecars, sorted.
    pub fn list_page_texts(&self) -> Result<Vec<PathBuf>> {
        self.list_sorted("txt", &[])
    }

    fn list_sorted(&self, extension: &str, exclude: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let wanted_prefix = format!("{}-", self.prefix());
        let mut matches = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&wanted_prefix) {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if exclude.contains(&path) {
                continue;
            }
            matches.push(path);
        }
        matches.sort();
        Ok(matches)
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if self.keep {
            info!(dir = %self.dir.display(), run = %self.run_id, "temporary files kept");
            return;
        }
        let token = self.run_id.to_string();
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Error logs embed the token mid-name, so match anywhere.
            if name.contains(&token) && path.is_file() {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(path = %path.display(), %err, "failed to remove temp file"),
                }
            }
        }
        debug!(removed, "temporary artifacts cleaned up");
    }
}
