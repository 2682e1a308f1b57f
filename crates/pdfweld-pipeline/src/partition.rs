// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-range partitioning for parallel rasterization.

use pdfweld_core::error::{Result, WeldError};
use pdfweld_core::types::PageRange;
use tracing::debug;

/// Divide `page_count` pages into at most `workers` contiguous,
/// non-overlapping, 1-indexed ranges covering every page exactly once.
///
/// Each range spans `ceil(page_count / workers)` pages; the last range is
/// clamped to the document end.
///
/// # Errors
///
/// The covered-page postcondition is checked explicitly; a mismatch returns
/// [`WeldError::Internal`] because it can only mean a defect in this
/// function, never bad input.
pub fn partition(page_count: u32, workers: usize) -> Result<Vec<PageRange>> {
    if page_count == 0 || workers == 0 {
        return Err(WeldError::Internal(format!(
            "partition called with page_count={page_count}, workers={workers}"
        )));
    }

    let range_size = page_count.div_ceil(workers as u32);
    let range_count = page_count.div_ceil(range_size);

    let mut ranges = Vec::with_capacity(range_count as usize);
    for index in 0..range_count {
        let start = range_size * index + 1;
        let end = (start + range_size - 1).min(page_count);
        ranges.push(PageRange::new(start, end));
    }

    let covered: u32 = ranges.iter().map(PageRange::len).sum();
    if covered != page_count {
        return Err(WeldError::Internal(format!(
            "page ranges cover {covered} pages, document has {page_count}"
        )));
    }

    debug!(page_count, workers, ranges = ranges.len(), range_size, "pages partitioned");
    Ok(ranges)
}
