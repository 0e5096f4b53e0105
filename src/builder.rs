//! SnapshotBuilder - drives V8's snapshot creator.
//!
//! A builder owns one snapshot-creator isolate and is consumed by
//! [`SnapshotBuilder::build`], so an engine instance produces exactly one
//! blob. The steps run in a fixed order, tracked by [`BuildStage`]:
//! 1. Create the isolate against [`EXTERNAL_REFERENCES`]
//! 2. Build the default context through [`bootstrap::initialize`]
//! 3. Serialize embedder internal fields and register the default context
//! 4. Create the blob with [`FUNCTION_CODE_HANDLING`]

use anyhow::{anyhow, bail, Result};
use deno_core::v8;
use once_cell::sync::OnceCell;

use crate::artifact::{self, SNAPSHOT_SYMBOL};
use crate::bindings::EXTERNAL_REFERENCES;
use crate::bootstrap;
use crate::config::{ArtifactFormat, Config};
use crate::internal_fields::{
    serialize_internal_field, EmbedderFields, FieldHolder, SerializeInternalFieldsCallback,
};

/// Function code handling used for every blob.
///
/// `Keep` makes the serializer corrupt memory on this V8, so there is no way
/// to select it.
pub const FUNCTION_CODE_HANDLING: v8::FunctionCodeHandling = v8::FunctionCodeHandling::Clear;

static ENGINE: OnceCell<()> = OnceCell::new();

/// Initialize the V8 platform once per process, applying the engine flags
/// from `config` first.
pub fn init_engine(config: &Config) -> Result<()> {
    let mut initialized_here = false;
    ENGINE.get_or_try_init(|| -> Result<()> {
        initialized_here = true;
        apply_engine_flags(&config.engine_flags)?;
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform);
        v8::V8::initialize();
        log::info!("V8 {} initialized", v8::V8::get_version());
        Ok(())
    })?;

    if !initialized_here && !config.engine_flags.is_empty() {
        log::warn!(
            "V8 already initialized, ignoring engine flags: {}",
            config.engine_flags.join(" ")
        );
    }
    Ok(())
}

fn apply_engine_flags(flags: &[String]) -> Result<()> {
    if flags.is_empty() {
        return Ok(());
    }
    let mut args = vec!["snapshot-creator".to_string()];
    args.extend(flags.iter().cloned());

    // V8 removes the flags it understands and hands back the rest.
    let rest = v8::V8::set_flags_from_command_line(args);
    if rest.len() > 1 {
        bail!("Unrecognized V8 flags: {}", rest[1..].join(" "));
    }
    log::debug!("V8 flags: {}", flags.join(" "));
    Ok(())
}

/// Progress of a single snapshot build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    /// No engine yet.
    Uninitialized,
    /// Snapshot-creator isolate exists.
    EngineCreated,
    /// Bootstrap ran in the default context.
    ContextBuilt,
    /// Internal fields handed over and default context registered.
    SerializerRegistered,
    /// Blob produced; the isolate is gone.
    BlobCreated,
    /// Artifact persisted.
    Written,
}

impl BuildStage {
    /// The only stage that may follow this one.
    pub fn next(self) -> Option<Self> {
        use BuildStage::*;
        match self {
            Uninitialized => Some(EngineCreated),
            EngineCreated => Some(ContextBuilt),
            ContextBuilt => Some(SerializerRegistered),
            SerializerRegistered => Some(BlobCreated),
            BlobCreated => Some(Written),
            Written => None,
        }
    }

    /// Move to `to`, which must be the stage directly after this one.
    pub fn advance(&mut self, to: Self) -> Result<()> {
        if self.next() != Some(to) {
            bail!("Invalid snapshot stage transition {:?} -> {:?}", self, to);
        }
        log::debug!("snapshot stage {:?} -> {:?}", self, to);
        *self = to;
        Ok(())
    }
}

/// A finished snapshot blob.
#[derive(Debug)]
pub struct SnapshotBlob {
    bytes: Box<[u8]>,
    stage: BuildStage,
}

impl SnapshotBlob {
    /// Raw blob bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Blob length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if V8 produced no data.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Last stage reached by the build that produced this blob.
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Persist the blob under the `snapshot` symbol. Consumes the blob.
    pub fn write(mut self, path: &std::path::Path, format: ArtifactFormat) -> Result<BuildStage> {
        artifact::write_artifact(SNAPSHOT_SYMBOL, path, &self.bytes, format)?;
        self.stage.advance(BuildStage::Written)?;
        Ok(self.stage)
    }
}

/// Owns a snapshot-creator isolate for one build.
pub struct SnapshotBuilder {
    isolate: v8::OwnedIsolate,
    stage: BuildStage,
}

impl SnapshotBuilder {
    /// Create the engine instance. Initializes V8 with `config` if this is
    /// the first engine in the process.
    pub fn new(config: &Config) -> Result<Self> {
        init_engine(config)?;

        let mut stage = BuildStage::Uninitialized;
        let isolate = v8::Isolate::snapshot_creator(Some(&*EXTERNAL_REFERENCES), None);
        stage.advance(BuildStage::EngineCreated)?;

        Ok(Self { isolate, stage })
    }

    /// Current build stage.
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Run `source` in a fresh default context and serialize the heap.
    ///
    /// `source` must already be wrapped (see [`crate::preprocess::wrap`]).
    pub fn build(mut self, label: &str, source: &str) -> Result<SnapshotBlob> {
        let prepared = {
            let scope = &mut v8::HandleScope::new(&mut self.isolate);
            let context = v8::Context::new(scope, Default::default());
            let scope = &mut v8::ContextScope::new(scope, context);

            let mut fields = EmbedderFields::new();
            let result = bootstrap::initialize(scope, context, label, source, &mut fields)
                .and_then(|()| self.stage.advance(BuildStage::ContextBuilt))
                .and_then(|()| register_internal_fields(scope, &fields, serialize_internal_field))
                .and_then(|bytes| {
                    log::debug!(
                        "{} embedder object(s), {} bytes of internal fields",
                        fields.len(),
                        bytes
                    );
                    self.stage.advance(BuildStage::SerializerRegistered)
                });

            // A snapshot-creator isolate can only be released through
            // create_blob, which needs a default context even on failure.
            scope.set_default_context(context);
            result
        };

        let Self { isolate, mut stage } = self;
        let blob = isolate.create_blob(FUNCTION_CODE_HANDLING);
        prepared?;

        let blob = blob.ok_or_else(|| anyhow!("V8 failed to create the snapshot blob"))?;
        stage.advance(BuildStage::BlobCreated)?;
        log::info!("Snapshot blob created for {label} ({} bytes)", blob.len());

        Ok(SnapshotBlob {
            bytes: blob.to_vec().into_boxed_slice(),
            stage,
        })
    }
}

/// Run `serializer` over every slot of every embedder object and hand the
/// payloads to V8 as internal field values.
///
/// Each payload buffer moves into its own backing store, so V8 owns and
/// eventually frees it. Returns the number of payload bytes handed over.
pub(crate) fn register_internal_fields<'s>(
    scope: &mut v8::HandleScope<'s>,
    fields: &EmbedderFields<'s>,
    serializer: SerializeInternalFieldsCallback,
) -> Result<usize> {
    let mut total = 0;
    for holder in fields.iter() {
        for index in 0..holder.field_count() {
            let Some(payload) = serializer(holder, index, std::ptr::null_mut()).into_boxed_slice()
            else {
                continue;
            };
            let len = payload.len();

            let store = v8::ArrayBuffer::new_backing_store_from_boxed_slice(payload).make_shared();
            let buffer = v8::ArrayBuffer::with_backing_store(scope, &store);
            let view = v8::Uint8Array::new(scope, buffer, 0, len)
                .ok_or_else(|| anyhow!("Could not create view for internal field {index}"))?;
            let value: v8::Local<v8::Value> = view.into();
            if !holder.object().set_internal_field(index, value.into()) {
                bail!("Could not store internal field {index}");
            }

            log::debug!("serialized internal field {index} ({len} bytes)");
            total += len;
        }
    }
    Ok(total)
}
