//! snapshot-creator - builds restorable V8 heap snapshots.
//!
//! This crate runs bootstrap JavaScript once inside a V8 snapshot-creator
//! isolate and freezes the resulting heap into a blob, written out as a Rust
//! source file (or raw bytes) that a runtime can load at startup instead of
//! re-executing the bootstrap.

mod artifact;
mod bindings;
mod bootstrap;
mod builder;
mod config;
mod internal_fields;
mod pipeline;
mod preprocess;

pub use artifact::{write_artifact, SNAPSHOT_SYMBOL};
pub use bindings::{BindingRecord, BINDINGS_GLOBAL, EXTERNAL_REFERENCES};
pub use bootstrap::initialize;
pub use builder::{init_engine, BuildStage, SnapshotBlob, SnapshotBuilder, FUNCTION_CODE_HANDLING};
pub use config::{ArtifactFormat, Config};
pub use internal_fields::{
    serialize_internal_field, EmbedderFields, EmbedderObject, FieldHolder, InternalFieldRecord,
    SerializeInternalFieldsCallback, SerializedField, RECORD_SIZE,
};
pub use pipeline::{create_snapshot, BuildSummary};
pub use preprocess::{wrap, MARKER};
