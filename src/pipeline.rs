//! End-to-end snapshot creation: read, wrap, build, write.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};
use deno_core::v8;
use serde::Serialize;

use crate::builder::SnapshotBuilder;
use crate::config::{ArtifactFormat, Config};
use crate::preprocess;

/// What a successful run produced, printed as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub input: String,
    pub output: String,
    pub format: ArtifactFormat,
    pub snapshot_bytes: usize,
    pub elapsed_ms: u64,
    pub engine_version: String,
}

/// Create the snapshot described by `config` and write its artifact.
///
/// The source is checked before any engine is created, and nothing is
/// written unless the blob was built.
pub fn create_snapshot(config: &Config) -> Result<BuildSummary> {
    let start = Instant::now();

    let source = fs::read_to_string(&config.input)
        .with_context(|| format!("Failed to read file '{}'", config.input.display()))?;
    let wrapped = preprocess::wrap(&source)
        .with_context(|| format!("Cannot snapshot '{}'", config.input.display()))?;

    let label = config.label();
    let blob = SnapshotBuilder::new(config)?.build(&label, &wrapped)?;
    let snapshot_bytes = blob.len();
    blob.write(&config.output, config.format)?;

    Ok(BuildSummary {
        input: label,
        output: config.output.display().to_string(),
        format: config.format,
        snapshot_bytes,
        elapsed_ms: start.elapsed().as_millis() as u64,
        engine_version: v8::V8::get_version().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(dir: &Path, source: &str, output: &str) -> Config {
        let input = dir.join("bootstrap.js");
        fs::write(&input, source).unwrap();
        Config::from_args(vec![
            "snapshot-creator".to_string(),
            input.display().to_string(),
            dir.join(output).display().to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_rust_source_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "42;\n//# sourceMappingURL=x.map\n", "snapshot.rs");

        let summary = create_snapshot(&config).unwrap();
        assert!(summary.snapshot_bytes > 0);
        assert_eq!(summary.format, ArtifactFormat::RustSource);

        let written = fs::read_to_string(&config.output).unwrap();
        let header = format!("pub static snapshot: [u8; {}]", summary.snapshot_bytes);
        assert!(written.contains(&header));
    }

    #[test]
    fn test_create_binary_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "42;\n//# sourceMappingURL=x.map\n", "snapshot.bin");

        let summary = create_snapshot(&config).unwrap();
        assert_eq!(fs::read(&config.output).unwrap().len(), summary.snapshot_bytes);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["format"], "binary");
        assert_eq!(json["snapshot_bytes"], summary.snapshot_bytes);
    }

    #[test]
    fn test_missing_marker_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "42;\n", "snapshot.rs");

        let err = create_snapshot(&config).unwrap_err();
        assert!(format!("{err:#}").contains("source map comment"));
        assert!(!config.output.exists());
    }

    #[test]
    fn test_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            input: dir.path().join("nope.js"),
            output: dir.path().join("snapshot.rs"),
            ..Default::default()
        };
        let err = create_snapshot(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
        assert!(!config.output.exists());
    }

    #[test]
    fn test_failed_bootstrap_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            dir.path(),
            "undefinedFunction();\n//# sourceMappingURL=x.map\n",
            "snapshot.rs",
        );
        assert!(create_snapshot(&config).is_err());
        assert!(!config.output.exists());
    }
}
