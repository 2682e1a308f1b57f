// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deskew phase — straighten each page image in place with `mogrify`.
//
// Item failures are logged and never fatal to the batch. Running this phase
// at all forces the rebuild-from-images merge path, because the mutated
// images no longer match the original vector content.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::pool::WorkerPool;
use crate::tools::{ExternalTools, run_logged};

/// Deskew every image in place. Returns the number of failed items (for
/// logging only — failures are non-fatal).
#[instrument(skip_all, fields(images = images.len(), threshold))]
pub fn deskew_all(
    tools: &ExternalTools,
    pool: &WorkerPool,
    threshold: &str,
    images: &[PathBuf],
) -> usize {
    info!("applying deskew (final PDF will be rebuilt from images)");

    let outcomes = pool.run_all(images.to_vec(), |image| {
        let result = run_logged(
            &tools.mogrify,
            [
                "-deskew".to_string(),
                threshold.to_string(),
                image.display().to_string(),
            ],
            None,
        );
        (image, result)
    });

    let mut failed = 0usize;
    for (image, result) in outcomes {
        match result {
            Ok(run) if run.success() => {}
            Ok(run) => {
                failed += 1;
                warn!(image = %image.display(), exit_code = ?run.exit_code, "deskew failed");
            }
            Err(err) => {
                failed += 1;
                warn!(image = %image.display(), %err, "mogrify could not be run");
            }
        }
    }
    info!(failed, "deskew phase complete");
    failed
}
