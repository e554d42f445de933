//! `jsbox-runtime` evaluates JavaScript in a sandboxed, resource-bounded QuickJS engine and
//! bridges it to the host program.
//!
//! # Evaluating code
//!
//! An [`Instance`] owns one engine runtime and context. Code is evaluated as a global script,
//! with top-level `await`, and the completion value comes back as a host [`Val`]:
//!
//! ```
//! use jsbox_runtime::{Instance, Limits, Val};
//!
//! let mut inst = Instance::new(Limits::default()).unwrap();
//! inst.eval("var greeting = 'hello';").unwrap();
//! assert_eq!(inst.eval("greeting + ' world'").unwrap(), Val::from("hello world"));
//! assert_eq!(inst.eval("await Promise.resolve(40 + 2)").unwrap(), Val::Int(42));
//! ```
//!
//! Guest `undefined` and `NaN` have no native host counterpart; they come back as the sentinels
//! [`Val::Undefined`] and [`Val::NaN`].
//!
//! # Host functions
//!
//! Host functions are closures over a [`Vmctx`] and the marshaled arguments. They are installed
//! as guest globals:
//!
//! ```
//! use jsbox_runtime::{HostError, Instance, Limits, Val};
//!
//! let mut inst = Instance::new(Limits::default()).unwrap();
//! inst.define_function("add", |_vmctx, args| {
//!     let a = args.get(0).and_then(Val::as_f64).ok_or_else(|| HostError::msg("not a number"))?;
//!     let b = args.get(1).and_then(Val::as_f64).ok_or_else(|| HostError::msg("not a number"))?;
//!     Ok(Val::from(a + b))
//! })
//! .unwrap();
//! assert_eq!(inst.eval("add(1, 2)").unwrap(), Val::Int(3));
//! ```
//!
//! A failure returned by a host function is thrown into the guest. If the guest lets it escape,
//! `eval` fails with [`Error::Host`] holding the very [`HostError`] the function returned.
//!
//! # Limits
//!
//! Every evaluation runs under the budget of [`Limits::timeout`], measured on a monotonic clock.
//! Nested evaluations started from host functions share the budget of the evaluation that called
//! them. Running out of engine memory faults the instance; it must then be discarded.

#![deny(bare_trait_objects)]

pub use jsbox_runtime_internals::error::{
    self, Error, ErrorKind, ExceptionDetails, INTERRUPTED_ERROR_NAME, INTERRUPTED_MESSAGE,
    NATIVE_ERROR_NAMES,
};
pub use jsbox_runtime_internals::host_error::HostError;
pub use jsbox_runtime_internals::hostcall::{
    self, is_valid_name, CallingConvention, HostPanic, HostResult,
};
pub use jsbox_runtime_internals::import::ImportSpec;
pub use jsbox_runtime_internals::instance::{self, Instance, State};
pub use jsbox_runtime_internals::limits::{Features, Limits};
pub use jsbox_runtime_internals::log::{LogEntry, LogRecord, Severity};
pub use jsbox_runtime_internals::registry::IDENTITY_KEY_PROPERTY;
pub use jsbox_runtime_internals::translate::HOST_CLASS_PROPERTY;
pub use jsbox_runtime_internals::val::Val;
pub use jsbox_runtime_internals::vmctx::Vmctx;

/// Evaluate `code` on a fresh instance that is disposed afterwards.
pub fn eval(code: &str, limits: Limits) -> Result<Val, Error> {
    let mut inst = Instance::new(limits)?;
    let res = inst.eval(code);
    if let Err(e) = &res {
        tracing::debug!(kind = ?e.kind(), "one-shot evaluation failed: {}", e);
    }
    inst.dispose();
    res
}
