//! Host functions callable from the guest.
//!
//! Every registered name is installed as a guest global backed by one native function. A call
//! marshals its arguments to host values, runs the host function against the deadline already in
//! force, and hands the outcome back either as a return value or, for the asynchronous
//! convention, as a settled promise.

use crate::error::{Error, ExceptionDetails, INTERRUPTED_ERROR_NAME};
use crate::host_error::HostError;
use crate::instance::InstanceInner;
use crate::marshal;
use crate::translate;
use crate::val::Val;
use crate::vmctx::Vmctx;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Promise, Value};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use thiserror::Error;

pub type HostResult = Result<Val, HostError>;

pub(crate) type HostFn = Rc<dyn Fn(&mut Vmctx<'_, '_>, &[Val]) -> HostResult>;

/// How the outcome of a host function is delivered to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallingConvention {
    /// The result is returned and a failure is thrown.
    Sync,
    /// The call returns a promise, fulfilled with the result or rejected with the failure.
    Async,
}

impl Default for CallingConvention {
    fn default() -> Self {
        CallingConvention::Sync
    }
}

/// A host function panicked instead of returning.
#[derive(Debug, Error)]
#[error("host function `{function}` panicked: {message}")]
pub struct HostPanic {
    pub function: String,
    pub message: String,
}

#[derive(Clone)]
pub(crate) struct FunctionEntry {
    callable: HostFn,
    convention: CallingConvention,
}

impl FunctionEntry {
    pub(crate) fn new(callable: HostFn, convention: CallingConvention) -> Self {
        FunctionEntry {
            callable,
            convention,
        }
    }
}

/// Registered host functions by guest-visible name.
#[derive(Default)]
pub(crate) struct FunctionTable {
    entries: RefCell<HashMap<String, FunctionEntry>>,
}

impl FunctionTable {
    /// Returns `true` if an earlier registration under `name` was replaced.
    pub(crate) fn insert(&self, name: &str, entry: FunctionEntry) -> bool {
        self.entries
            .borrow_mut()
            .insert(name.to_owned(), entry)
            .is_some()
    }

    fn lookup(&self, name: &str) -> Option<FunctionEntry> {
        self.entries.borrow().get(name).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be called as a plain identifier from guest code.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_ascii_alphabetic() => (),
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric()) && !RESERVED_WORDS.contains(&name)
}

/// Install (or reinstall) the guest global for `name`.
pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    name: &str,
) -> rquickjs::Result<()> {
    let bridge = inner.clone();
    let function_name = name.to_owned();
    let func = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            dispatch(&ctx, &bridge, &function_name, args.0)
        },
    )?;
    ctx.globals().set(name, func)
}

fn dispatch<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    name: &str,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let entry = match inner.functions.lookup(name) {
        Some(entry) => entry,
        None => {
            return Err(Exception::throw_reference(
                ctx,
                &format!("Host function `{}` is not defined", name),
            ))
        }
    };

    let mut host_args = Vec::with_capacity(args.len());
    for arg in args {
        match marshal::guest_to_host(ctx, &inner.registry, arg) {
            Ok(v) => host_args.push(v),
            Err(e) => return Err(translate::throw_into_guest(ctx, &inner.registry, e)),
        }
    }

    let outcome = call_host(ctx, inner, name, &entry.callable, &host_args);

    match entry.convention {
        CallingConvention::Sync => match outcome {
            Ok(val) => marshal::host_to_guest(ctx, &inner.registry, &val),
            Err(e) => Err(translate::throw_into_guest(ctx, &inner.registry, Error::Host(e))),
        },
        CallingConvention::Async => {
            let (promise, resolve, reject) = Promise::new(ctx)?;
            match outcome {
                Ok(val) => match marshal::host_to_guest(ctx, &inner.registry, &val) {
                    Ok(value) => resolve.call::<_, ()>((value,))?,
                    Err(e) => {
                        let reason = conversion_failure(ctx, inner, e)?;
                        reject.call::<_, ()>((reason,))?;
                    }
                },
                Err(e) => {
                    let reason = translate::host_error_to_guest(ctx, &inner.registry, &e)?;
                    reject.call::<_, ()>((reason,))?;
                }
            }
            Ok(promise.into_value())
        }
    }
}

/// The guest value an async call rejects with when its result cannot be converted.
fn conversion_failure<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    err: rquickjs::Error,
) -> rquickjs::Result<Value<'js>> {
    if err.is_exception() {
        return Ok(ctx.catch());
    }
    let failure = HostError::new(translate::from_js_error(ctx, &inner.registry, None, err));
    translate::host_error_to_guest(ctx, &inner.registry, &failure)
}

fn call_host<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    name: &str,
    callable: &HostFn,
    args: &[Val],
) -> HostResult {
    tracing::trace!(function = name, args = args.len(), "calling host function");
    let mut vmctx = Vmctx::new(ctx.clone(), inner, name);

    // unwinding must not cross the engine's frames
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (**callable)(&mut vmctx, args)))
        .unwrap_or_else(|payload| {
            tracing::error!(function = name, "host function panicked");
            Err(HostError::new(HostPanic {
                function: name.to_owned(),
                message: panic_message(&*payload),
            }))
        });

    if inner.governor.should_abort() {
        tracing::error!(function = name, "host function returned past the deadline");
        let details = ExceptionDetails::new(format!(
            "host function `{}` exceeded the evaluation deadline",
            name
        ))
        .with_js_name(INTERRUPTED_ERROR_NAME);
        return Err(HostError::new(Error::Interrupted(details)));
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_names_are_valid() {
        for name in &["add", "_private", "$", "camelCase2", "a_b$c"] {
            assert!(is_valid_name(name), "{} should be valid", name);
        }
    }

    #[test]
    fn malformed_names_are_invalid() {
        for name in &["", "1abc", "with space", "dash-ed", "dot.ted", "return", "ñ"] {
            assert!(!is_valid_name(name), "{} should be invalid", name);
        }
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload = panic::catch_unwind(|| panic!("kaboom")).unwrap_err();
        assert_eq!(panic_message(&*payload), "kaboom");
        let payload = panic::catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 1");
    }
}
