pub mod execution;
pub mod state;

pub use crate::instance::execution::{DeadlineGuard, Governor};
pub use crate::instance::state::State;

use crate::error::{Error, ExceptionDetails};
use crate::heap::{HeapMeter, MeteredAllocator};
use crate::hostcall::{self, CallingConvention, FunctionEntry, FunctionTable, HostResult};
use crate::import::{self, ImportSpec};
use crate::limits::Limits;
use crate::log::{self, LogRecord, LogSink};
use crate::marshal;
use crate::polyfill::{self, timers::TimerQueue};
use crate::registry::IdentityRegistry;
use crate::translate;
use crate::val::Val;
use crate::vmctx::Vmctx;
use rquickjs::context::EvalOptions;
use rquickjs::promise::PromiseState;
use rquickjs::{Context, Ctx, Module, Promise, Runtime, Value};
use std::rc::Rc;
use std::sync::Arc;

/// State shared between an [`Instance`] and the native functions it installs in the guest.
pub(crate) struct InstanceInner {
    pub(crate) limits: Limits,
    pub(crate) governor: Arc<Governor>,
    pub(crate) registry: IdentityRegistry,
    pub(crate) functions: FunctionTable,
    pub(crate) sink: LogSink,
    pub(crate) timers: TimerQueue,
}

impl InstanceInner {
    fn translate<'js>(&self, ctx: &Ctx<'js>, err: rquickjs::Error) -> Error {
        translate::from_js_error(ctx, &self.registry, Some(&self.sink), err)
    }
}

/// A sandboxed JavaScript engine together with its bridge to the host.
///
/// An instance owns exactly one engine runtime and one context. Global state persists across
/// evaluations until the instance is [disposed](#method.dispose), after which every operation
/// fails with [`Error::Disposed`].
pub struct Instance {
    // declared before `runtime` so the context is freed first
    context: Option<Context>,
    runtime: Option<Runtime>,
    inner: Rc<InstanceInner>,
    heap: HeapMeter,
    state: State,
}

impl Instance {
    pub fn new(limits: Limits) -> Result<Instance, Error> {
        limits.validate()?;

        let heap = HeapMeter::default();
        let runtime = Runtime::new_with_alloc(MeteredAllocator::new(limits.memory_limit, heap.clone()))
            .map_err(|e| jsbox_format_err!("cannot create engine runtime: {}", e))?;
        runtime.set_max_stack_size(limits.max_stack_size);

        let governor = Governor::new();
        let hook = governor.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || hook.should_abort())));

        let context = Context::full(&runtime)
            .map_err(|e| jsbox_format_err!("cannot create engine context: {}", e))?;

        let inner = Rc::new(InstanceInner {
            limits,
            governor,
            registry: IdentityRegistry::new(),
            functions: FunctionTable::default(),
            sink: LogSink::new(),
            timers: TimerQueue::default(),
        });

        context.with(|ctx| {
            log::install_console(&ctx, &inner)
                .and_then(|()| polyfill::install(&ctx, &inner))
                .map_err(|e| translate::from_js_error(&ctx, &inner.registry, None, e))
        })?;

        tracing::info!(
            memory_limit = inner.limits.memory_limit,
            max_stack_size = inner.limits.max_stack_size,
            timeout_ms = inner.limits.timeout.as_millis() as u64,
            "instance created"
        );

        Ok(Instance {
            context: Some(context),
            runtime: Some(runtime),
            inner,
            heap,
            state: State::Ready,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.is_faulted()
    }

    fn live_context(&self) -> Result<&Context, Error> {
        match self.state {
            State::Ready => self.context.as_ref().ok_or(Error::Disposed),
            State::Faulted { .. } => Err(Error::Faulted),
            State::Disposed => Err(Error::Disposed),
        }
    }

    /// Fault the instance if the engine was refused memory while producing `res`.
    ///
    /// The outcome is replaced by [`Error::LimitsExceeded`] then, even when the guest caught the
    /// failed allocation.
    fn observe<T>(&mut self, res: Result<T, Error>) -> Result<T, Error> {
        if !self.heap.is_exhausted() {
            return res;
        }
        let reason = format!(
            "out of memory: the engine heap is limited to {} bytes",
            self.inner.limits.memory_limit
        );
        tracing::error!(%reason, "instance faulted");
        self.state = State::Faulted {
            reason: reason.clone(),
        };
        Err(Error::LimitsExceeded(reason))
    }

    /// Evaluate `code` as a global script, with top-level `await` allowed.
    ///
    /// The completion value of the script is returned once every promise job has run. A promise
    /// as the completion value fails with [`Error::NoAwait`].
    pub fn eval(&mut self, code: &str) -> Result<Val, Error> {
        let res = {
            let context = self.live_context()?;
            let inner = &self.inner;
            tracing::debug!(len = code.len(), "evaluating script");
            context.with(|ctx| eval_in_context(&ctx, inner, code))
        };
        if let Err(Error::Interrupted(_)) = &res {
            tracing::error!("evaluation interrupted by the deadline");
        }
        self.observe(res)
    }

    /// Register a host function the guest can call by `name`.
    ///
    /// Registering a name again replaces the earlier function. Returns the name.
    pub fn define_function<F>(&mut self, name: &str, f: F) -> Result<String, Error>
    where
        F: Fn(&mut Vmctx<'_, '_>, &[Val]) -> HostResult + 'static,
    {
        self.define_function_with(name, CallingConvention::Sync, f)
    }

    /// Register a host function whose outcome reaches the guest as a promise.
    pub fn define_async_function<F>(&mut self, name: &str, f: F) -> Result<String, Error>
    where
        F: Fn(&mut Vmctx<'_, '_>, &[Val]) -> HostResult + 'static,
    {
        self.define_function_with(name, CallingConvention::Async, f)
    }

    pub fn define_function_with<F>(
        &mut self,
        name: &str,
        convention: CallingConvention,
        f: F,
    ) -> Result<String, Error>
    where
        F: Fn(&mut Vmctx<'_, '_>, &[Val]) -> HostResult + 'static,
    {
        if !hostcall::is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let context = self.live_context()?;
        let inner = &self.inner;

        let replaced = inner
            .functions
            .insert(name, FunctionEntry::new(Rc::new(f), convention));
        context.with(|ctx| {
            hostcall::install(&ctx, inner, name)
                .map_err(|e| translate::from_js_error(&ctx, &inner.registry, None, e))
        })?;
        tracing::debug!(
            function = name,
            ?convention,
            replaced,
            registered = inner.functions.len(),
            "host function defined"
        );
        Ok(name.to_owned())
    }

    /// Evaluate `from` as a module and bind the imports described by `spec`.
    ///
    /// The bindings are exposed to later evaluations by assigning them to `globalThis`, or by
    /// running `code_to_expose` instead when it is given.
    pub fn import<S: Into<ImportSpec>>(
        &mut self,
        spec: S,
        from: &str,
        code_to_expose: Option<&str>,
    ) -> Result<bool, Error> {
        let spec = spec.into();
        if from.trim().is_empty() {
            return Err(Error::Runtime(ExceptionDetails::new("missing import source")));
        }
        let module_name = import::random_module_name();
        let glue = import::glue_source(&spec, &module_name, code_to_expose);

        let res = {
            let context = self.live_context()?;
            let inner = &self.inner;
            tracing::debug!(module = %module_name, clause = %spec.clause(), "importing module");
            context.with(|ctx| import_in_context(&ctx, inner, &module_name, from, &glue))
        };
        self.observe(res).map(|()| true)
    }

    /// The buffered log records, oldest first.
    pub fn logs(&self) -> Vec<LogRecord> {
        self.inner.sink.records()
    }

    /// Like [`logs`](#method.logs), but empties the buffer.
    pub fn take_logs(&mut self) -> Vec<LogRecord> {
        self.inner.sink.take_records()
    }

    /// Deliver every later log record to `listener` instead of the buffer.
    ///
    /// An error returned by the listener is thrown from the guest's console call.
    pub fn on_log<F>(&mut self, listener: F)
    where
        F: FnMut(&LogRecord) -> Result<(), crate::host_error::HostError> + 'static,
    {
        self.inner.sink.set_listener(Box::new(listener));
    }

    /// Tear the engine down. Calling this more than once is harmless.
    pub fn dispose(&mut self) {
        if self.state.is_disposed() {
            return;
        }
        if let Some(context) = self.context.as_ref() {
            let inner = &self.inner;
            context.with(|_ctx| {
                inner.timers.clear();
                inner.registry.clear();
            });
        }
        self.inner.governor.disarm();
        if let Some(runtime) = self.runtime.as_ref() {
            runtime.set_interrupt_handler(None);
        }
        self.context = None;
        self.runtime = None;
        self.inner.functions.clear();
        self.state = State::Disposed;
        tracing::info!("instance disposed");
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.state)
            .field("limits", &self.inner.limits)
            .field("functions", &self.inner.functions.len())
            .field("timers", &self.inner.timers.len())
            .field("sink", &self.inner.sink)
            .finish()
    }
}

/// Evaluate a script on a context that is already entered, under the deadline in force.
///
/// This is the shared path of top-level and re-entrant evaluation.
pub(crate) fn eval_in_context<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    code: &str,
) -> Result<Val, Error> {
    let _deadline = inner.governor.arm(inner.limits.timeout);

    let mut options = EvalOptions::default();
    options.global = true;
    options.strict = false;
    options.promise = true;
    let promise: Promise<'js> = ctx
        .eval_with_options(code, options)
        .map_err(|e| inner.translate(ctx, e))?;

    let completion = drain(ctx, inner, &promise)?;
    let value = match completion.as_object() {
        Some(obj) => obj
            .get::<_, Value>("value")
            .map_err(|e| inner.translate(ctx, e))?,
        None => completion,
    };
    if value.is_promise() {
        return Err(Error::NoAwait);
    }
    marshal::guest_to_host(ctx, &inner.registry, value)
}

fn import_in_context<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    module_name: &str,
    source: &str,
    glue: &str,
) -> Result<(), Error> {
    let _deadline = inner.governor.arm(inner.limits.timeout);

    Module::declare(ctx.clone(), module_name, source).map_err(|e| inner.translate(ctx, e))?;
    let glue_name = format!("{}.glue", module_name);
    let promise =
        Module::evaluate(ctx.clone(), glue_name, glue).map_err(|e| inner.translate(ctx, e))?;
    drain(ctx, inner, &promise)?;
    Ok(())
}

/// Run promise jobs, then timers, until `promise` settles.
///
/// This is the only place evaluation waits. A promise still pending once there is nothing left
/// to run can never settle.
fn drain<'js>(
    ctx: &Ctx<'js>,
    inner: &InstanceInner,
    promise: &Promise<'js>,
) -> Result<Value<'js>, Error> {
    loop {
        match promise.state() {
            PromiseState::Resolved => {
                return match promise.result::<Value<'js>>() {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(e)) => Err(inner.translate(ctx, e)),
                    None => Err(Error::NoAwait),
                }
            }
            PromiseState::Rejected => {
                return match promise.result::<Value<'js>>() {
                    Some(Err(e)) => Err(inner.translate(ctx, e)),
                    Some(Ok(reason)) => Err(translate::exception_to_error(
                        ctx,
                        &inner.registry,
                        Some(&inner.sink),
                        reason,
                    )),
                    None => Err(Error::NoAwait),
                }
            }
            PromiseState::Pending => {
                if inner.governor.should_abort() {
                    // a job cut short by the interrupt hook leaves its exception pending
                    let _ = ctx.catch();
                    return Err(Error::interrupted());
                }
                if ctx.execute_pending_job() {
                    continue;
                }
                if polyfill::timers::run_next(ctx, inner)? {
                    continue;
                }
                return Err(Error::NoAwait);
            }
        }
    }
}
