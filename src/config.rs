//! Command line configuration.
//!
//! Parsed once in `main` and passed by reference to everything downstream.
//! The last two arguments are the bootstrap script and the artifact path;
//! everything before them must be engine (V8) flags.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

/// How the snapshot blob is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// A Rust source file defining a `snapshot` byte array.
    #[default]
    RustSource,
    /// The raw blob, for `include_bytes!` or direct loading.
    Binary,
}

impl ArtifactFormat {
    /// `.bin` outputs are written raw; everything else as Rust source.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bin") => ArtifactFormat::Binary,
            _ => ArtifactFormat::RustSource,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bootstrap JavaScript file.
    pub input: PathBuf,
    /// Where the artifact is written.
    pub output: PathBuf,
    pub format: ArtifactFormat,
    /// Flags handed to V8 before the platform is initialized.
    pub engine_flags: Vec<String>,
}

impl Config {
    /// Parse `args` as received from `std::env::args` (program name first).
    pub fn from_args(args: Vec<String>) -> Result<Self> {
        let program = args
            .first()
            .map(|s| s.as_str())
            .unwrap_or("snapshot-creator")
            .to_string();

        let mut args: Vec<String> = args.into_iter().skip(1).collect();
        let positional = args.split_off(args.len().saturating_sub(2));
        let engine_flags = collect_engine_flags(args).map_err(|extra| {
            anyhow!(
                "Usage: {program} [V8_FLAGS...] <bootstrap.js> <output>\n\n\
                 Expected 2 positional arguments, got {}",
                extra + 2
            )
        })?;

        for flag in &engine_flags {
            if names_function_code_handling(flag) {
                bail!("{flag}: function code handling is fixed to `clear` and cannot be configured");
            }
        }

        let [input, output]: [String; 2] = positional.try_into().map_err(|rest: Vec<String>| {
            anyhow!(
                "Usage: {program} [V8_FLAGS...] <bootstrap.js> <output>\n\n\
                 Expected 2 positional arguments, got {}",
                rest.len()
            )
        })?;

        if input.is_empty() {
            bail!("Input path is empty");
        }
        for path in [&input, &output] {
            if is_flag(path) {
                bail!("{path}: engine flags must come before the input and output paths");
            }
        }
        if output.is_empty() {
            bail!("Output path is empty");
        }

        let output = PathBuf::from(output);
        Ok(Self {
            input: PathBuf::from(input),
            format: ArtifactFormat::for_path(&output),
            output,
            engine_flags,
        })
    }

    /// Script name the bootstrap source is compiled under.
    pub fn label(&self) -> String {
        self.input.display().to_string()
    }
}

fn is_flag(arg: &str) -> bool {
    arg.len() > 1 && arg.starts_with('-')
}

/// Group everything before the two paths into V8 flags.
///
/// V8 takes `-flag` and `--flag`, with the value either after `=` or as the
/// next argument; a separate value is folded into `--flag=value`. Returns the
/// number of stray arguments that belong to no flag.
fn collect_engine_flags(args: Vec<String>) -> std::result::Result<Vec<String>, usize> {
    let mut flags: Vec<String> = Vec::new();
    let mut stray = 0;
    let mut takes_value = false;
    for arg in args {
        if is_flag(&arg) {
            takes_value = !arg.contains('=');
            flags.push(arg);
        } else if takes_value {
            if let Some(flag) = flags.last_mut() {
                flag.push('=');
                flag.push_str(&arg);
            }
            takes_value = false;
        } else {
            stray += 1;
        }
    }
    if stray > 0 {
        Err(stray)
    } else {
        Ok(flags)
    }
}

fn names_function_code_handling(flag: &str) -> bool {
    flag.to_ascii_lowercase()
        .replace('-', "_")
        .contains("function_code")
}
