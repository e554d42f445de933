//! Interfaces for accessing instance data from host functions.

use crate::error::Error;
use crate::instance::{self, InstanceInner};
use crate::limits::Limits;
use crate::val::Val;
use rquickjs::Ctx;
use std::rc::Rc;
use std::time::Duration;

/// A handle to the running instance, passed to every host function call.
///
/// It only exists while the guest is calling into the host, which is what makes re-entering
/// evaluation through [`Vmctx::eval`] sound.
pub struct Vmctx<'a, 'js> {
    ctx: Ctx<'js>,
    inner: &'a Rc<InstanceInner>,
    function: &'a str,
}

impl<'a, 'js> Vmctx<'a, 'js> {
    pub(crate) fn new(ctx: Ctx<'js>, inner: &'a Rc<InstanceInner>, function: &'a str) -> Self {
        Vmctx {
            ctx,
            inner,
            function,
        }
    }

    /// The guest-visible name the running host function was called by.
    pub fn function_name(&self) -> &str {
        self.function
    }

    /// Time left before the deadline of the evaluation that called this function.
    pub fn remaining(&self) -> Duration {
        self.inner
            .governor
            .remaining()
            .unwrap_or(self.inner.limits.timeout)
    }

    pub fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    /// Evaluate more guest code on the calling instance.
    ///
    /// The nested evaluation runs against the deadline already in force; it does not get a budget
    /// of its own.
    pub fn eval(&mut self, code: &str) -> Result<Val, Error> {
        tracing::debug!(function = self.function, "re-entering evaluation");
        instance::eval_in_context(&self.ctx, self.inner, code)
    }
}

impl std::fmt::Debug for Vmctx<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vmctx")
            .field("function", &self.function)
            .field("remaining", &self.remaining())
            .finish()
    }
}
