// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterization phase — one image per input page at 300 DPI.
//
// PDF inputs are split into page ranges and fanned out over the pool, one
// pdftoppm invocation per range. Image inputs go through a single `convert`
// call with `-scene 1` so multi-frame TIFFs unroll into numbered pages.
// pdftoppm's zero-padded page numbering provides the sort-order contract the
// later phases rely on; a page that fails to rasterize is simply absent and
// is detected downstream.

use std::path::PathBuf;

use pdfweld_core::config::WeldConfig;
use pdfweld_core::error::Result;
use pdfweld_core::types::{InputKind, PageRange};
use tracing::{info, instrument, warn};

use crate::partition::partition;
use crate::pool::WorkerPool;
use crate::tools::{ExternalTools, ToolOutcome, run_logged};
use crate::workdir::Workdir;

/// Outcome of one rasterize invocation (a range for PDFs, the whole file
/// otherwise).
#[derive(Debug)]
pub struct RasterizeOutcome {
    pub range: Option<PageRange>,
    pub result: Result<ToolOutcome>,
}

/// Rasterize the input into per-page images and return them in page order.
#[instrument(skip_all, fields(kind = ?kind))]
pub fn rasterize_all(
    tools: &ExternalTools,
    pool: &WorkerPool,
    config: &WeldConfig,
    workdir: &Workdir,
    kind: InputKind,
    page_count: Option<u32>,
) -> Result<Vec<PathBuf>> {
    info!("converting input file to images");

    if kind.is_pdf() {
        rasterize_pdf(tools, pool, config, workdir, page_count)?;
    } else {
        rasterize_image_input(tools, config, workdir)?;
    }

    let images = workdir.list_page_images()?;
    info!(images = images.len(), "rasterization complete");
    Ok(images)
}

fn rasterize_pdf(
    tools: &ExternalTools,
    pool: &WorkerPool,
    config: &WeldConfig,
    workdir: &Workdir,
    page_count: Option<u32>,
) -> Result<()> {
    let ranges = match page_count {
        Some(pages) => Some(partition(pages, pool.workers())?),
        // Without a page count the only option is one unranged call.
        None => None,
    };

    let outcomes: Vec<RasterizeOutcome> = match ranges {
        Some(ranges) => pool.run_all(ranges, |range| RasterizeOutcome {
            range: Some(range),
            result: run_range(tools, config, workdir, Some(range)),
        }),
        None => vec![RasterizeOutcome {
            range: None,
            result: run_range(tools, config, workdir, None),
        }],
    };

    for outcome in &outcomes {
        match &outcome.result {
            Ok(run) if run.success() => {}
            Ok(run) => warn!(
                range = ?outcome.range,
                exit_code = ?run.exit_code,
                log = %workdir.rasterize_err_log(outcome.range).display(),
                "pdftoppm reported failure for range"
            ),
            Err(err) => warn!(range = ?outcome.range, %err, "pdftoppm could not be run"),
        }
    }
    Ok(())
}

fn run_range(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
    range: Option<PageRange>,
) -> Result<ToolOutcome> {
    let mut args: Vec<String> = Vec::new();
    if let Some(range) = range {
        args.extend([
            "-f".to_string(),
            range.start.to_string(),
            "-l".to_string(),
            range.end.to_string(),
        ]);
    }
    args.extend(["-r".to_string(), "300".to_string(), "-jpeg".to_string()]);
    args.push(config.input.display().to_string());
    args.push(workdir.image_root().display().to_string());

    let log = workdir.rasterize_err_log(range);
    run_logged(&tools.pdftoppm, &args, Some(&log))
}

fn rasterize_image_input(
    tools: &ExternalTools,
    config: &WeldConfig,
    workdir: &Workdir,
) -> Result<()> {
    let args: Vec<String> = vec![
        config.input.display().to_string(),
        "-quality".to_string(),
        "100".to_string(),
        "-scene".to_string(),
        "1".to_string(),
        workdir.image_scene_pattern().display().to_string(),
    ];
    match run_logged(&tools.convert, &args, None) {
        Ok(run) if run.success() => {}
        Ok(run) => warn!(exit_code = ?run.exit_code, "convert reported failure for image input"),
        Err(err) => warn!(%err, "convert could not be run"),
    }
    Ok(())
}
