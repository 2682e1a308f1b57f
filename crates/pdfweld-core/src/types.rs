// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the pdfweld OCR pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-invocation correlation token.
///
/// Every temporary artifact of one run carries this token in its file name,
/// which is what allows concurrent invocations to share a temp directory and
/// what cleanup matches against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        // 8 hex chars are plenty; the token only needs to be unique among
        // concurrent runs on one host.
        let full = Uuid::new_v4().simple().to_string();
        Self(full[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous, inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of pages covered (inclusive on both ends).
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Supported input document kinds, derived from the `file` tool's mime output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Pdf,
    Tiff,
    Jpeg,
    Png,
}

impl InputKind {
    /// Map a mime type string to a supported input kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "image/tiff" => Some(Self::Tiff),
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// Image re-encoding preset used when the final PDF is rebuilt from the
/// rasterized page images. The argument strings are passed to ImageMagick's
/// `convert` between the image list and the output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildPreset {
    /// Fast bitonal output.
    Fast,
    /// Best-quality bitonal output (default).
    Best,
    /// Bitonal output tuned for grayscale sources.
    Grayscale,
    /// Keep original color as JPEG.
    Jpeg,
    /// Keep original color as JPEG2000.
    Jpeg2000,
    /// Literal user-supplied `convert` arguments (whitespace-split).
    Custom(String),
}

impl RebuildPreset {
    /// Parse a CLI preset selector. Unknown selectors are treated as a
    /// literal filter spec.
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "fast" => Self::Fast,
            "best" => Self::Best,
            "grayscale" => Self::Grayscale,
            "jpeg" => Self::Jpeg,
            "jpeg2000" => Self::Jpeg2000,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The `convert` argument list for this preset.
    pub fn convert_args(&self) -> Vec<String> {
        let spec = match self {
            Self::Fast => "-threshold 60% -compress Group4",
            Self::Best => "-colors 2 -colorspace gray -normalize -threshold 60% -compress Group4",
            Self::Grayscale => "-threshold 85% -morphology Dilate Diamond -compress Group4",
            Self::Jpeg => "-strip -interlace Plane -gaussian-blur 0.05 -quality 50% -compress JPEG",
            Self::Jpeg2000 => "-quality 32% -compress JPEG2000",
            Self::Custom(spec) => spec.as_str(),
        };
        spec.split_whitespace().map(str::to_string).collect()
    }
}

impl Default for RebuildPreset {
    fn default() -> Self {
        Self::Best
    }
}

/// Facts about the input document, read once at validation time.
///
/// Transformations never mutate the input in place; everything downstream
/// works from copies keyed off these facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Total page count, when it could be determined.
    pub page_count: Option<u32>,
    /// Whether the document carries an encryption dictionary.
    pub encrypted: bool,
    /// Best-effort: whether any page references a font (i.e. likely already
    /// has a text layer).
    pub has_text: bool,
    /// Info-dictionary metadata, restricted to string-representable entries.
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_short_and_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_eq!(a.as_str().len(), 8);
        assert_ne!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn page_range_len_inclusive() {
        assert_eq!(PageRange::new(1, 3).len(), 3);
        assert_eq!(PageRange::new(10, 10).len(), 1);
    }

    #[test]
    fn input_kind_from_mime() {
        assert_eq!(InputKind::from_mime("application/pdf"), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_mime("image/png"), Some(InputKind::Png));
        assert_eq!(InputKind::from_mime("text/plain"), None);
    }

    #[test]
    fn preset_selectors_round_trip() {
        assert_eq!(RebuildPreset::from_arg("fast"), RebuildPreset::Fast);
        assert_eq!(RebuildPreset::from_arg("jpeg2000"), RebuildPreset::Jpeg2000);
        assert_eq!(
            RebuildPreset::from_arg("-threshold 60% -compress Group4"),
            RebuildPreset::Custom("-threshold 60% -compress Group4".to_string())
        );
    }

    #[test]
    fn preset_args_split() {
        let args = RebuildPreset::Fast.convert_args();
        assert_eq!(args, vec!["-threshold", "60%", "-compress", "Group4"]);

        let custom = RebuildPreset::Custom("-quality 10%".into());
        assert_eq!(custom.convert_args(), vec!["-quality", "10%"]);
    }
}
