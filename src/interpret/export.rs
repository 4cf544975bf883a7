//! Writing a rendered report to disk.

use std::path::{Path, PathBuf};
use tracing::info;

use super::result::InterpretationResult;
use crate::config::OutputFormat;
use crate::error::{InterpretError, Result};

/// Write the report for `format` to `path` and return the path written.
///
/// The extension is forced to `.txt` (cli) or `.md` (markdown). The parent
/// directory must already exist.
pub fn export_interpretation(
    result: &InterpretationResult,
    path: impl AsRef<Path>,
    format: OutputFormat,
) -> Result<PathBuf> {
    let requested = path.as_ref();
    if requested.file_name().is_none() {
        return Err(InterpretError::Export(format!(
            "'{}' does not name a file",
            requested.display()
        )));
    }

    let target = requested.with_extension(format.extension());
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(InterpretError::Export(format!(
                "directory '{}' does not exist",
                parent.display()
            )));
        }
    }

    let rendered = result.with_output_args(result.output_args.with_format(format));
    std::fs::write(&target, rendered.report.as_bytes()).map_err(|source| InterpretError::Io {
        path: target.clone(),
        source,
    })?;

    info!(
        path = %target.display(),
        format = format.as_str(),
        "Exported interpretation"
    );
    Ok(target)
}
