// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run configuration.
//
// One immutable `WeldConfig` is built by the CLI layer and threaded through
// the pipeline; transient per-run state lives in the pipeline's own RunState,
// never here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::RebuildPreset;

/// Immutable configuration for a single pdfweld invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeldConfig {
    /// Input document (PDF or TIFF/JPEG/PNG image).
    pub input: PathBuf,
    /// Explicit output path; derived from the input name when absent.
    pub output: Option<PathBuf>,
    /// Tesseract language spec, e.g. "por+eng".
    pub languages: String,
    /// Tesseract page segmentation mode.
    pub page_seg_mode: String,
    /// Fraction of available parallelism to use, in (0, 1].
    pub parallel_fraction: f64,
    /// Deskew threshold percentage (e.g. "40%"); deskew runs only when set.
    pub deskew_threshold: Option<String>,
    /// Image re-encoding preset for the rebuild-from-images path.
    pub rebuild_preset: RebuildPreset,
    /// Always rebuild the final PDF from the rasterized images.
    pub force_rebuild: bool,
    /// Refuse to overwrite existing output files.
    pub safe_mode: bool,
    /// Abort if the input PDF already carries a text layer.
    pub check_text: bool,
    /// Abort if the input PDF is encrypted.
    pub check_protection: bool,
    /// Also write a concatenated plain-text sidecar next to the output PDF.
    pub text_sidecar: bool,
    /// Use external `pdftk multibackground` for the direct merge instead of
    /// the built-in page-by-page merge.
    pub use_pdftk: bool,
    /// Keep temporary artifacts for debugging.
    pub keep_temps: bool,
    /// Verbose (debug-level) logging.
    pub verbose: bool,
}

impl WeldConfig {
    /// Minimal config for the given input with all defaults.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            languages: "por+eng".to_string(),
            page_seg_mode: "1".to_string(),
            parallel_fraction: 1.0,
            deskew_threshold: None,
            rebuild_preset: RebuildPreset::default(),
            force_rebuild: false,
            safe_mode: false,
            check_text: false,
            check_protection: false,
            text_sidecar: false,
            use_pdftk: false,
            keep_temps: false,
            verbose: false,
        }
    }

    /// Number of pool workers: `floor(available_parallelism × fraction)`,
    /// never below 1. Computed once at startup.
    pub fn worker_budget(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let budget = (cores as f64 * self.parallel_fraction).floor() as usize;
        budget.max(1)
    }

    pub fn deskew_enabled(&self) -> bool {
        self.deskew_threshold.is_some()
    }
}
