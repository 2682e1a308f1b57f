// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for pdfweld.

use thiserror::Error;

/// Top-level error type for all pdfweld operations.
#[derive(Debug, Error)]
pub enum WeldError {
    // -- User input --
    #[error("invalid input: {0}")]
    Input(String),

    // -- External tools --
    #[error("required external tool missing: {0}")]
    ToolMissing(String),

    #[error("external tool failed: {0}")]
    Tool(String),

    // -- Document surgery --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("merge failed: {0}")]
    Merge(String),

    // -- Pipeline --
    #[error("pipeline failed: {0}")]
    Pipeline(String),

    /// Internal-consistency fault. Reaching this variant means a logic
    /// defect, never bad user input or a flaky external tool.
    #[error("internal consistency fault: {0}")]
    Internal(String),

    // -- I/O --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WeldError {
    /// Whether this error indicates a bug in pdfweld rather than a bad
    /// input or environment.
    pub fn is_internal(&self) -> bool {
        matches!(self, WeldError::Internal(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WeldError>;
