//! Persisting snapshot blobs.
//!
//! The artifact is staged next to its destination and renamed into place,
//! so a failed write never leaves a truncated file at `path`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::config::ArtifactFormat;

/// Symbol the blob is exported under in generated source.
pub const SNAPSHOT_SYMBOL: &str = "snapshot";

const BYTES_PER_LINE: usize = 16;

/// Write `bytes` to `path` in `format`.
pub fn write_artifact(
    symbol: &str,
    path: &Path,
    bytes: &[u8],
    format: ArtifactFormat,
) -> Result<()> {
    let contents = match format {
        ArtifactFormat::RustSource => render_rust_source(symbol, bytes)?.into_bytes(),
        ArtifactFormat::Binary => bytes.to_vec(),
    };

    let staging = staging_path(path)?;
    if let Err(e) = fs::write(&staging, &contents) {
        let _ = fs::remove_file(&staging);
        return Err(e).with_context(|| format!("Failed to write '{}'", staging.display()));
    }
    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(e).with_context(|| format!("Failed to move artifact to '{}'", path.display()));
    }

    log::info!(
        "Wrote {} byte snapshot to {} ({:?})",
        bytes.len(),
        path.display(),
        format
    );
    Ok(())
}

/// Render `bytes` as a Rust source file exporting `pub static <symbol>`.
pub fn render_rust_source(symbol: &str, bytes: &[u8]) -> Result<String> {
    if !is_identifier(symbol) {
        bail!("{symbol:?} is not a valid Rust identifier");
    }

    let mut out = String::with_capacity(bytes.len() * 6 + 256);
    out.push_str("// @generated by snapshot-creator. Do not edit.\n\n");
    out.push_str("#[allow(non_upper_case_globals)]\n");
    writeln!(out, "pub static {symbol}: [u8; {}] = [", bytes.len())?;
    for line in bytes.chunks(BYTES_PER_LINE) {
        out.push_str("   ");
        for byte in line {
            write!(out, " 0x{byte:02x},")?;
        }
        out.push('\n');
    }
    out.push_str("];\n");
    Ok(out)
}

fn is_identifier(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Output path '{}' has no file name", path.display()))?;
    let mut staged = name.to_os_string();
    staged.push(".tmp");
    Ok(path.with_file_name(staged))
}
