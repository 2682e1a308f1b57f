// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfweld — make scanned PDFs searchable ("sandwich" PDFs).
//
// Entry point. Parses arguments, initialises logging, and drives the OCR
// pipeline. Exit code 0 on success, 1 on any fatal condition.

use std::path::PathBuf;

use clap::Parser;

use pdfweld_core::WeldConfig;
use pdfweld_core::types::RebuildPreset;
use pdfweld_pipeline::OcrPipeline;

const REBUILD_PRESET_HELP: &str = "\
Image re-encode preset used when the final PDF is rebuilt from images \
(encrypted/non-PDF input, deskew, or --force-rebuild):
  fast      -> fast bitonal file (\"-threshold 60% -compress Group4\")
  best      -> best-quality bitonal file (default)
  grayscale -> bitonal file tuned for grayscale documents
  jpeg      -> keep original color as JPEG
  jpeg2000  -> keep original color as JPEG2000
Anything else is passed to `convert` verbatim (whitespace-split, no shell \
quoting): e.g. \"-threshold 60% -compress Group4\"";

#[derive(Debug, Parser)]
#[command(name = "pdfweld", version, about = "Weld an invisible OCR text layer onto a scanned PDF or image, producing a searchable PDF")]
struct Cli {
    /// Path of the input PDF or image (TIFF/JPEG/PNG) file.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Force the output to a specific location.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Tesseract language spec (joined with '+').
    #[arg(short = 'l', long = "langs", value_name = "LANGS", default_value = "por+eng")]
    langs: String,

    /// Tesseract page segmentation mode. Use with caution.
    #[arg(short = 'm', long = "psm", value_name = "MODE", default_value = "1")]
    psm: String,

    /// Fraction of available CPU parallelism to use, in (0, 1].
    #[arg(short = 'j', long = "jobs", value_name = "FRACTION", default_value = "1.0", value_parser = parse_fraction)]
    jobs: f64,

    /// Deskew the page images before OCR, e.g. '40%'. Forces a rebuild of
    /// the final PDF from the (now modified) images.
    #[arg(short = 'd', long = "deskew", value_name = "PERCENT")]
    deskew: Option<String>,

    #[arg(short = 'g', long = "rebuild-preset", value_name = "PRESET", help = REBUILD_PRESET_HELP)]
    rebuild_preset: Option<String>,

    /// Safe mode: refuse to overwrite existing output files.
    #[arg(short = 's', long = "safe-mode")]
    safe_mode: bool,

    /// Do not process if the source PDF already has text.
    #[arg(short = 't', long = "check-text")]
    check_text: bool,

    /// Do not process if the source PDF is encrypted.
    #[arg(short = 'a', long = "check-protection")]
    check_protection: bool,

    /// Force the final PDF to be rebuilt from the extracted images.
    #[arg(short = 'f', long = "force-rebuild")]
    force_rebuild: bool,

    /// Also write a concatenated text file next to the output PDF.
    #[arg(short = 'w', long = "text-sidecar")]
    text_sidecar: bool,

    /// Use the external pdftk tool for the final overlay instead of the
    /// built-in merge.
    #[arg(short = 'p', long = "use-pdftk")]
    use_pdftk: bool,

    /// Keep temporary files for debugging.
    #[arg(short = 'k', long = "keep-temps")]
    keep_temps: bool,

    /// Verbose (debug) logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> WeldConfig {
        let mut config = WeldConfig::new(self.input);
        config.output = self.output;
        config.languages = self.langs;
        config.page_seg_mode = self.psm;
        config.parallel_fraction = self.jobs;
        config.deskew_threshold = self.deskew;
        if let Some(preset) = &self.rebuild_preset {
            config.rebuild_preset = RebuildPreset::from_arg(preset);
        }
        config.safe_mode = self.safe_mode;
        config.check_text = self.check_text;
        config.check_protection = self.check_protection;
        config.force_rebuild = self.force_rebuild;
        config.text_sidecar = self.text_sidecar;
        config.use_pdftk = self.use_pdftk;
        config.keep_temps = self.keep_temps;
        config.verbose = self.verbose;
        config
    }
}

/// Parse the parallelism fraction, restricted to (0.0, 1.0].
fn parse_fraction(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if value <= 0.0 || value > 1.0 {
        return Err(format!("{value} not in range (0.0, 1.0]"));
    }
    Ok(value)
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("pdfweld {} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.into_config();
    let outcome = OcrPipeline::prepare(config).and_then(|pipeline| pipeline.run());

    match outcome {
        Ok(summary) => {
            tracing::info!(
                output = %summary.output.display(),
                pages_ocr = summary.pages_ocr,
                rebuilt = summary.report.rebuilt,
                "success"
            );
            if let Some(text_output) = &summary.text_output {
                tracing::info!(text_output = %text_output.display(), "text file created");
            }
        }
        Err(err) => {
            tracing::error!(%err, "pdfweld failed");
            eprintln!("pdfweld: {err}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fraction_bounds() {
        assert!(parse_fraction("0.5").is_ok());
        assert!(parse_fraction("1.0").is_ok());
        assert!(parse_fraction("0").is_err());
        assert!(parse_fraction("1.5").is_err());
        assert!(parse_fraction("cores").is_err());
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::parse_from([
            "pdfweld", "-i", "scan.pdf", "-d", "40%", "-j", "0.5", "-g", "jpeg", "-t", "-s", "-w",
        ]);
        let config = cli.into_config();
        assert_eq!(config.input, PathBuf::from("scan.pdf"));
        assert_eq!(config.deskew_threshold.as_deref(), Some("40%"));
        assert_eq!(config.parallel_fraction, 0.5);
        assert_eq!(config.rebuild_preset, RebuildPreset::Jpeg);
        assert!(config.check_text);
        assert!(config.safe_mode);
        assert!(config.text_sidecar);
        assert!(!config.force_rebuild);
        // Defaults carried through untouched.
        assert_eq!(config.languages, "por+eng");
        assert_eq!(config.page_seg_mode, "1");
    }
}
