// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External tool discovery and invocation.
//
// Everything the pipeline cannot (or should not) do in-process is delegated
// to well-known open-source tools: poppler's pdftoppm for rasterization,
// ImageMagick for deskew and image re-encoding, tesseract for OCR inference,
// ghostscript for the PostScript round-trip repair, `file` for mime
// detection, and optionally pdftk for the external multibackground merge.
// Required tools are resolved once at startup; a missing one aborts before
// any work begins.

use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pdfweld_core::error::{Result, WeldError};
use tracing::{debug, info, instrument, warn};

/// Resolved paths of every external collaborator.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    pub tesseract: PathBuf,
    pub convert: PathBuf,
    pub mogrify: PathBuf,
    pub file: PathBuf,
    pub pdftoppm: PathBuf,
    /// Ghostscript pair for the repair round-trip; absent means repair is
    /// unavailable (warned at startup, merge falls through to FATAL sooner).
    pub pdf2ps: Option<PathBuf>,
    pub ps2pdf: Option<PathBuf>,
    /// Only resolved when the user asked for the pdftk merge strategy.
    pub pdftk: Option<PathBuf>,
}

impl ExternalTools {
    /// Resolve all tool paths from PATH, aborting on any missing required
    /// tool.
    #[instrument]
    pub fn discover(require_pdftk: bool) -> Result<Self> {
        let tesseract = require("tesseract")?;
        let mogrify = require("mogrify")?;
        let file = require("file")?;
        let pdftoppm = require("pdftoppm")?;
        let convert = discover_convert()?;

        let pdf2ps = find_executable("pdf2ps");
        let ps2pdf = find_executable("ps2pdf");
        if pdf2ps.is_none() || ps2pdf.is_none() {
            warn!("pdf2ps or ps2pdf (ghostscript) not found; PDF repair will not work");
        }

        let pdftk = if require_pdftk {
            Some(require("pdftk")?)
        } else {
            None
        };

        info!("external tools resolved");
        Ok(Self {
            tesseract,
            convert,
            mogrify,
            file,
            pdftoppm,
            pdf2ps,
            ps2pdf,
            pdftk,
        })
    }
}

fn require(name: &str) -> Result<PathBuf> {
    find_executable(name).ok_or_else(|| WeldError::ToolMissing(name.to_string()))
}

/// Locate an executable on PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{name}.exe"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Prefer `convert`, but only if it is actually ImageMagick's (Windows ships
/// an unrelated `convert`); otherwise fall back to `magick`.
fn discover_convert() -> Result<PathBuf> {
    if let Some(convert) = find_executable("convert") {
        if convert_probe(&convert) {
            return Ok(convert);
        }
        debug!(path = %convert.display(), "convert failed the ImageMagick probe");
    }
    if let Some(magick) = find_executable("magick") {
        return Ok(magick);
    }
    Err(WeldError::ToolMissing(
        "convert/magick from ImageMagick".to_string(),
    ))
}

/// Smoke-test a `convert` candidate by rendering ImageMagick's built-in
/// `rose:` image.
fn convert_probe(convert: &Path) -> bool {
    let probe = std::env::temp_dir().join(format!("weldprobe-{}.jpg", std::process::id()));
    let ok = Command::new(convert)
        .arg("rose:")
        .arg(&probe)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    let _ = std::fs::remove_file(&probe);
    ok
}

/// Outcome of one external invocation: the exit code plus whether it
/// signalled success. Output-file absence remains a separate, secondary
/// integrity check at the call sites.
#[derive(Debug, Clone, Copy)]
pub struct ToolOutcome {
    pub exit_code: Option<i32>,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run an external tool to completion, discarding stdout and sending stderr
/// to `stderr_log` (or to nowhere when `None`).
///
/// A non-zero exit is NOT an error here — callers decide whether a failed
/// item is fatal. Failing to even spawn the process is.
pub fn run_logged<I, S>(program: &Path, args: I, stderr_log: Option<&Path>) -> Result<ToolOutcome>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stderr = match stderr_log {
        Some(log_path) => Stdio::from(File::create(log_path)?),
        None => Stdio::null(),
    };
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(stderr)
        .status()
        .map_err(|err| {
            WeldError::Tool(format!("failed to run {}: {err}", program.display()))
        })?;

    debug!(program = %program.display(), code = ?status.code(), "external tool finished");
    Ok(ToolOutcome {
        exit_code: status.code(),
    })
}

/// Ask the `file` tool for the input's mime type.
pub fn detect_mime(file_tool: &Path, input: &Path) -> Result<String> {
    let output = Command::new(file_tool)
        .arg("-b")
        .arg("--mime-type")
        .arg(input)
        .stderr(Stdio::null())
        .output()
        .map_err(|err| {
            WeldError::Tool(format!("failed to run {}: {err}", file_tool.display()))
        })?;
    if !output.status.success() {
        return Err(WeldError::Tool(format!(
            "mime detection failed with exit code {:?}",
            output.status.code()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
