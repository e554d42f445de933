//! Diagnostics emitted by guest code.

use crate::error::Error;
use crate::host_error::HostError;
use crate::instance::InstanceInner;
use crate::marshal;
use crate::translate;
use crate::val::Val;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Verbose,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Verbose => "verbose",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument of a console call: the marshaled value and the guest's own rendering of it.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub raw: Val,
    pub rendered: String,
}

impl LogEntry {
    pub fn text<S: Into<String>>(text: S) -> LogEntry {
        let rendered = text.into();
        LogEntry {
            raw: Val::String(rendered.clone()),
            rendered,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    severity: Severity,
    entries: Vec<LogEntry>,
}

impl LogRecord {
    pub fn new(severity: Severity, entries: Vec<LogEntry>) -> LogRecord {
        LogRecord { severity, entries }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn raw(&self) -> Vec<&Val> {
        self.entries.iter().map(|e| &e.raw).collect()
    }
}

/// Rendered entries joined by a space, the way a console prints them.
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&entry.rendered)?;
        }
        Ok(())
    }
}

pub type LogListener = Box<dyn FnMut(&LogRecord) -> Result<(), HostError>>;

/// Buffers log records, or hands them to a listener once one is registered.
#[derive(Default)]
pub struct LogSink {
    buffer: RefCell<Vec<LogRecord>>,
    listener: RefCell<Option<LogListener>>,
}

impl LogSink {
    pub fn new() -> LogSink {
        Self::default()
    }

    pub fn log(&self, record: LogRecord) -> Result<(), HostError> {
        tracing::trace!(target: "jsbox::console", severity = record.severity.as_str(), "{}", record);

        // the listener is taken out for the call, so a record logged from inside it is buffered
        let listener = self.listener.borrow_mut().take();
        match listener {
            Some(mut listener) => {
                let res = listener(&record);
                let mut slot = self.listener.borrow_mut();
                if slot.is_none() {
                    *slot = Some(listener);
                }
                res
            }
            None => {
                self.buffer.borrow_mut().push(record);
                Ok(())
            }
        }
    }

    /// Records logged before the listener was set stay in the buffer.
    pub fn set_listener(&self, listener: LogListener) {
        *self.listener.borrow_mut() = Some(listener);
    }

    pub fn has_listener(&self) -> bool {
        self.listener.borrow().is_some()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.buffer.borrow().clone()
    }

    pub fn take_records(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }

    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
        self.listener.borrow_mut().take();
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("buffered", &self.buffer.borrow().len())
            .field("listener", &self.has_listener())
            .finish()
    }
}

const CONSOLE_METHODS: [(&str, Severity); 5] = [
    ("log", Severity::Info),
    ("info", Severity::Info),
    ("debug", Severity::Verbose),
    ("warn", Severity::Warning),
    ("error", Severity::Error),
];

/// Install the guest `console` object, feeding the instance's sink.
pub(crate) fn install_console<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;
    for &(method, severity) in CONSOLE_METHODS.iter() {
        let bridge = inner.clone();
        let func = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                console_call(&ctx, &bridge, severity, args.0)
            },
        )?;
        console.set(method, func)?;
    }
    ctx.globals().set("console", console)
}

fn console_call<'js>(
    ctx: &Ctx<'js>,
    inner: &Rc<InstanceInner>,
    severity: Severity,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<()> {
    let mut entries = Vec::with_capacity(args.len());
    for arg in args {
        let rendered = marshal::render(ctx, arg.clone())?;
        let raw = if arg.is_promise() {
            Val::String("Promise".to_owned())
        } else {
            // logging an error must not use up its registry entry
            marshal::guest_to_host_retaining(ctx, &inner.registry, arg)
                .map_err(|e| translate::throw_into_guest(ctx, &inner.registry, e))?
        };
        entries.push(LogEntry { raw, rendered });
    }
    inner
        .sink
        .log(LogRecord::new(severity, entries))
        .map_err(|e| translate::throw_into_guest(ctx, &inner.registry, Error::Host(e)))
}
