// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfweld-pipeline — The orchestration core of pdfweld.
//
// Splits the input into per-page images, fans OCR and deskew work out across
// a bounded worker pool, reassembles the per-page results, and drives the
// merge/fallback state machine. Ordering between phases is recovered purely
// from deterministic, sortable artifact names; the only shared mutable
// resource is the correlation-token-prefixed working directory.

pub mod compose;
pub mod partition;
pub mod pool;
pub mod run;
pub mod stage;
pub mod tools;
pub mod workdir;

pub use compose::MergeReport;
pub use partition::partition;
pub use pool::WorkerPool;
pub use run::{OcrPipeline, RunSummary};
pub use tools::ExternalTools;
pub use workdir::Workdir;
