//! snapshot-creator CLI
//!
//! Runs a bootstrap script in a fresh V8 isolate and writes the resulting
//! heap snapshot as a loadable artifact.
//!
//! Usage:
//!   snapshot-creator [V8_FLAGS...] <bootstrap.js> <output>
//!
//! Arguments:
//!   <bootstrap.js>   Script to snapshot; its last line must be a
//!                    `//# sourceMappingURL=` comment
//!   <output>         `.bin` writes the raw blob, anything else a Rust source
//!                    file exporting `pub static snapshot: [u8; N]`
//!
//! Leading `--` arguments are passed to V8 (`--trace_serializer` is useful
//! when a snapshot fails to build).
//!
//! Output (JSON to stdout):
//!   {
//!     "input": "...",
//!     "output": "...",
//!     "format": "rust_source" | "binary",
//!     "snapshot_bytes": <number>,
//!     "elapsed_ms": <number>,
//!     "engine_version": "..."
//!   }
//!
//! Errors are written to stderr and exit code 1 is returned.

use std::env;
use std::process;

use anyhow::{anyhow, Result};
use snapshot_creator::{create_snapshot, Config};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::from_args(env::args().collect())?;

    let summary = create_snapshot(&config)?;

    let json = serde_json::to_string(&summary)
        .map_err(|e| anyhow!("Failed to serialize output: {}", e))?;
    println!("{}", json);

    Ok(())
}
