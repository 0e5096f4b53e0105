//! Native functions exposed to bootstrap JavaScript.
//!
//! These are the bridge between JavaScript and Rust inside the snapshot.
//! Every callback installed into the snapshotted context must also appear in
//! [`EXTERNAL_REFERENCES`]; otherwise a restored isolate cannot resolve it.

use deno_core::v8;
use deno_core::v8::MapFnTo;
use once_cell::sync::Lazy;

use crate::internal_fields::{InternalFieldRecord, RECORD_SIZE};

/// Name of the global object carrying the native bindings.
pub const BINDINGS_GLOBAL: &str = "__bindings";

/// Version of the binding table layout recorded in the snapshot.
pub const BINDING_TABLE_VERSION: u16 = 1;

/// Internal field slots on the bindings object.
pub const BINDING_SLOTS: usize = 2;

/// Slot holding the [`BindingRecord`]. The other slot is left empty.
pub const BINDING_RECORD_SLOT: usize = 0;

/// Callback table handed to the snapshot creator.
pub static EXTERNAL_REFERENCES: Lazy<v8::ExternalReferences> = Lazy::new(|| {
    v8::ExternalReferences::new(&[
        v8::ExternalReference {
            function: print.map_fn_to(),
        },
        v8::ExternalReference {
            function: print_err.map_fn_to(),
        },
        v8::ExternalReference {
            function: now.map_fn_to(),
        },
    ])
});

/// Number of native functions on the bindings object.
pub const BINDING_COUNT: u32 = 3;

/// Layout of the record stored on the bindings object.
///
/// Little-endian: `version: u16`, `flags: u16`, `function_count: u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingRecord {
    pub version: u16,
    pub flags: u16,
    pub function_count: u32,
}

impl BindingRecord {
    pub fn current() -> Self {
        Self {
            version: BINDING_TABLE_VERSION,
            flags: 0,
            function_count: BINDING_COUNT,
        }
    }

    pub fn to_record(self) -> InternalFieldRecord {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..2].copy_from_slice(&self.version.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.flags.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.function_count.to_le_bytes());
        InternalFieldRecord::from_bytes(bytes)
    }

    #[cfg(test)]
    pub fn from_record(record: &InternalFieldRecord) -> Self {
        let bytes = record.as_bytes();
        Self {
            version: u16::from_le_bytes([bytes[0], bytes[1]]),
            flags: u16::from_le_bytes([bytes[2], bytes[3]]),
            function_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Install the native functions on `target`.
pub fn install<'s>(
    scope: &mut v8::HandleScope<'s>,
    target: v8::Local<'s, v8::Object>,
) -> Option<()> {
    let functions = [
        ("print", v8::Function::new(scope, print)?),
        ("printErr", v8::Function::new(scope, print_err)?),
        ("now", v8::Function::new(scope, now)?),
    ];

    for (name, function) in functions {
        let key = v8::String::new(scope, name)?;
        target.set(scope, key.into(), function.into())?;
    }
    Some(())
}

fn join_args(scope: &mut v8::HandleScope, args: &v8::FunctionCallbackArguments) -> String {
    (0..args.length())
        .map(|i| args.get(i).to_rust_string_lossy(scope))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `__bindings.print(...args)`: bootstrap output, logged at info.
fn print(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, _rv: v8::ReturnValue) {
    let message = join_args(scope, &args);
    log::info!(target: "bootstrap", "{message}");
}

/// `__bindings.printErr(...args)`: bootstrap errors, logged at warn.
fn print_err(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    _rv: v8::ReturnValue,
) {
    let message = join_args(scope, &args);
    log::warn!(target: "bootstrap", "{message}");
}

/// `__bindings.now()`: milliseconds since the Unix epoch.
fn now(scope: &mut v8::HandleScope, _args: v8::FunctionCallbackArguments, mut rv: v8::ReturnValue) {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0);
    rv.set(v8::Number::new(scope, millis).into());
}
