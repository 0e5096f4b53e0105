//! Context initialization for the snapshot.
//!
//! This module provides the embedder side of the default context:
//! - Installs the `__bindings` object with native functions and its
//!   internal field records
//! - Runs a small prelude that defines `console` on top of those bindings
//! - Executes the (already wrapped) bootstrap source

use anyhow::{anyhow, Context as _, Result};
use deno_core::v8;

use crate::bindings::{self, BindingRecord, BINDINGS_GLOBAL, BINDING_RECORD_SLOT, BINDING_SLOTS};
use crate::internal_fields::EmbedderFields;

/// Script name the prelude is compiled under.
pub const PRELUDE_LABEL: &str = "[snapshot:prelude]";

/// JavaScript that runs before the bootstrap source.
///
/// It only assigns to `globalThis` and declares no top-level functions, so it
/// does not need the IIFE treatment the bootstrap source gets.
pub const PRELUDE_JS: &str = r#"
((bindings) => {
  const format = (args) => args.map((arg) => {
    if (arg === null) return 'null';
    if (arg === undefined) return 'undefined';
    if (typeof arg === 'object') {
      try {
        return JSON.stringify(arg);
      } catch (e) {
        return String(arg);
      }
    }
    return String(arg);
  }).join(' ');

  globalThis.console = {
    log: (...args) => bindings.print(format(args)),
    info: (...args) => bindings.print(format(args)),
    debug: (...args) => bindings.print(format(args)),
    warn: (...args) => bindings.printErr(format(args)),
    error: (...args) => bindings.printErr(format(args)),
  };
})(globalThis.__bindings);
"#;

/// Populate `context` for snapshotting.
///
/// Objects that carry internal field records are registered in `fields` so
/// the builder can serialize them before the context is frozen.
pub fn initialize<'s>(
    scope: &mut v8::HandleScope<'s>,
    context: v8::Local<'s, v8::Context>,
    label: &str,
    source: &str,
    fields: &mut EmbedderFields<'s>,
) -> Result<()> {
    install_bindings(scope, context, fields).context("Failed to install native bindings")?;
    execute(scope, PRELUDE_LABEL, PRELUDE_JS).context("Prelude failed")?;
    execute(scope, label, source).with_context(|| format!("Bootstrap script {label} failed"))?;
    Ok(())
}

fn install_bindings<'s>(
    scope: &mut v8::HandleScope<'s>,
    context: v8::Local<'s, v8::Context>,
    fields: &mut EmbedderFields<'s>,
) -> Result<()> {
    let template = v8::ObjectTemplate::new(scope);
    if !template.set_internal_field_count(BINDING_SLOTS) {
        return Err(anyhow!("Could not reserve {BINDING_SLOTS} internal fields"));
    }
    let object = template
        .new_instance(scope)
        .ok_or_else(|| anyhow!("Could not instantiate bindings object"))?;

    bindings::install(scope, object).ok_or_else(|| anyhow!("Could not attach native functions"))?;

    let mut slots = vec![None; BINDING_SLOTS];
    slots[BINDING_RECORD_SLOT] = Some(BindingRecord::current().to_record());
    fields.attach(object, slots);

    let global = context.global(scope);
    let key = v8::String::new(scope, BINDINGS_GLOBAL)
        .ok_or_else(|| anyhow!("Could not allocate {BINDINGS_GLOBAL} key"))?;
    global
        .set(scope, key.into(), object.into())
        .ok_or_else(|| anyhow!("Could not define globalThis.{BINDINGS_GLOBAL}"))?;
    Ok(())
}

/// Compile and run `source` as a classic script named `label`.
fn execute(scope: &mut v8::HandleScope, label: &str, source: &str) -> Result<()> {
    let name = v8::String::new(scope, label).ok_or_else(|| anyhow!("Script name too long"))?;
    let code = v8::String::new(scope, source).ok_or_else(|| anyhow!("Script source too long"))?;
    let origin = script_origin(scope, name);

    let tc = &mut v8::TryCatch::new(scope);
    let script = match v8::Script::compile(tc, code, Some(&origin)) {
        Some(script) => script,
        None => return Err(anyhow!(exception_message(tc))),
    };
    if script.run(tc).is_none() {
        return Err(anyhow!(exception_message(tc)));
    }
    Ok(())
}

fn script_origin<'s>(
    scope: &mut v8::HandleScope<'s>,
    resource_name: v8::Local<'s, v8::String>,
) -> v8::ScriptOrigin<'s> {
    v8::ScriptOrigin::new(
        scope,
        resource_name.into(),
        0,
        0,
        false,
        0,
        None,
        false,
        false,
        false,
        None,
    )
}

fn exception_message(tc: &mut v8::TryCatch<v8::HandleScope>) -> String {
    let Some(exception) = tc.exception() else {
        return "Script execution was terminated".to_string();
    };
    let message = exception.to_rust_string_lossy(tc);
    match tc.stack_trace() {
        Some(stack) => {
            let stack = stack.to_rust_string_lossy(tc);
            if stack.is_empty() {
                message
            } else {
                stack
            }
        }
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::init_engine;
    use crate::config::Config;
    use crate::internal_fields::FieldHolder;

    fn with_context<F>(f: F)
    where
        F: for<'s> FnOnce(&mut v8::HandleScope<'s>, v8::Local<'s, v8::Context>),
    {
        init_engine(&Config::default()).unwrap();
        let isolate = &mut v8::Isolate::new(Default::default());
        let scope = &mut v8::HandleScope::new(isolate);
        let context = v8::Context::new(scope, Default::default());
        let scope = &mut v8::ContextScope::new(scope, context);
        f(scope, context);
    }

    fn eval(scope: &mut v8::HandleScope, code: &str) -> String {
        let code = v8::String::new(scope, code).unwrap();
        let script = v8::Script::compile(scope, code, None).unwrap();
        script.run(scope).unwrap().to_rust_string_lossy(scope)
    }

    #[test]
    fn test_initialize_installs_bindings() {
        with_context(|scope, context| {
            let mut fields = EmbedderFields::new();
            initialize(scope, context, "boot.js", "globalThis.answer = 42;", &mut fields).unwrap();

            assert_eq!(eval(scope, "answer"), "42");
            assert_eq!(eval(scope, "typeof __bindings.print"), "function");
            assert_eq!(eval(scope, "typeof __bindings.now()"), "number");
            assert_eq!(eval(scope, "typeof console.log"), "function");

            assert_eq!(fields.len(), 1);
            let object = fields.iter().next().unwrap();
            assert_eq!(object.field_count(), BINDING_SLOTS);
            let record = object.internal_field(BINDING_RECORD_SLOT).unwrap();
            assert_eq!(BindingRecord::from_record(record), BindingRecord::current());
        });
    }

    #[test]
    fn test_binding_count_matches_installed_functions() {
        with_context(|scope, context| {
            let mut fields = EmbedderFields::new();
            initialize(scope, context, "boot.js", "1;", &mut fields).unwrap();

            let installed = eval(
                scope,
                "Object.values(__bindings).filter((f) => typeof f === 'function').length",
            );
            assert_eq!(installed, bindings::BINDING_COUNT.to_string());
            assert_eq!(BindingRecord::current().function_count, bindings::BINDING_COUNT);
        });
    }

    #[test]
    fn test_console_log_during_bootstrap() {
        with_context(|scope, context| {
            let mut fields = EmbedderFields::new();
            let source = "console.log('booting', { ok: true }); console.error(null);";
            initialize(scope, context, "boot.js", source, &mut fields).unwrap();
        });
    }

    #[test]
    fn test_script_exception_is_reported() {
        with_context(|scope, context| {
            let mut fields = EmbedderFields::new();
            let err = initialize(scope, context, "boot.js", "throw new Error('boom');", &mut fields)
                .unwrap_err();
            let chain = format!("{err:#}");
            assert!(chain.contains("boot.js"));
            assert!(chain.contains("boom"));
        });
    }

    #[test]
    fn test_syntax_error_is_reported() {
        with_context(|scope, context| {
            let mut fields = EmbedderFields::new();
            let err = initialize(scope, context, "boot.js", "let = ;", &mut fields).unwrap_err();
            assert!(format!("{err:#}").contains("SyntaxError"));
        });
    }
}
