//! Translation of exceptions across the bridge.
//!
//! Guest to host, in order:
//!
//! 1. an error object carrying a live registry key is the host error it stands for;
//! 2. the guest-native error classes map to their own kind;
//! 3. the engine's interruption becomes `Interrupted` with a fixed message;
//! 4. the bridge's interrupted marker becomes `Interrupted` with its own message;
//! 5. any other error object is a `Runtime` error;
//! 6. a thrown non-error value is a `Runtime` error with no guest class name.
//!
//! Host to guest, a host error becomes a fresh guest `Error` stamped with a registry key.

use crate::error::{Error, ExceptionDetails, INTERRUPTED_ERROR_NAME};
use crate::host_error::HostError;
use crate::log::{LogEntry, LogRecord, LogSink, Severity};
use crate::marshal::render;
use crate::registry::{key_from_guest, GuestOwner, IdentityRegistry, IDENTITY_KEY_PROPERTY};
use rquickjs::{Ctx, Exception, Object, Persistent, Type, Value};

/// Name of the guest property recording the host class of a translated host error.
pub const HOST_CLASS_PROPERTY: &str = "hostClass";

/// Translate an engine failure. A pending guest exception is consumed from the context.
///
/// With a sink, an uncaught exception is also recorded there before it is returned.
pub(crate) fn from_js_error<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    sink: Option<&LogSink>,
    err: rquickjs::Error,
) -> Error {
    match err {
        rquickjs::Error::Exception => exception_to_error(ctx, registry, sink, ctx.catch()),
        other => jsbox_format_err!("engine error: {}", other),
    }
}

pub(crate) fn exception_to_error<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    sink: Option<&LogSink>,
    exception: Value<'js>,
) -> Error {
    if exception.type_of() == Type::Exception {
        if let Some(obj) = exception.as_object() {
            if let Some(host) = take_registered(registry, obj) {
                return Error::Host(host);
            }
            let fields = read_error_object(ctx, obj);
            if let Some(sink) = sink {
                let headline = format!(
                    "Uncaught {}: {}\n{}",
                    fields.name,
                    fields.details.message,
                    fields.details.stack.as_deref().unwrap_or("")
                );
                tracing::debug!("{}", headline);
                record_uncaught(sink, headline);
            }
            return Error::from_guest(&fields.name, fields.details);
        }
    }

    let rendered = render(ctx, exception).unwrap_or_else(|_| {
        let _ = ctx.catch();
        String::new()
    });
    if let Some(sink) = sink {
        let headline = format!("Uncaught '{}'", rendered);
        tracing::debug!("{}", headline);
        record_uncaught(sink, headline);
    }
    Error::Runtime(ExceptionDetails::new(rendered))
}

fn record_uncaught(sink: &LogSink, headline: String) {
    let record = LogRecord::new(Severity::Error, vec![LogEntry::text(headline)]);
    if let Err(e) = sink.log(record) {
        tracing::error!("log listener failed on an uncaught exception: {}", e);
    }
}

/// The host error behind a guest error object, if it carries a live registry key.
///
/// The entry is consumed.
pub(crate) fn take_registered<'js>(
    registry: &IdentityRegistry,
    obj: &Object<'js>,
) -> Option<HostError> {
    registry.consume(registry_key(obj)?, |owner| is_stamped_on(owner, obj))
}

pub(crate) fn peek_registered<'js>(
    registry: &IdentityRegistry,
    obj: &Object<'js>,
) -> Option<HostError> {
    registry.resolve(registry_key(obj)?, |owner| is_stamped_on(owner, obj))
}

/// Whether a registry entry's owner is `obj` itself. A key copied onto another object is not
/// accepted.
fn is_stamped_on<'js>(owner: &GuestOwner, obj: &Object<'js>) -> bool {
    owner
        .clone()
        .restore(obj.ctx())
        .map_or(false, |stamped| stamped.as_value() == obj.as_value())
}

fn registry_key<'js>(obj: &Object<'js>) -> Option<u64> {
    let raw = obj.get::<_, Value>(IDENTITY_KEY_PROPERTY).ok()?;
    key_from_guest(raw.as_number()?)
}

/// A fresh host error for a guest error object that did not come from the host.
pub(crate) fn error_object_to_error<'js>(ctx: &Ctx<'js>, obj: &Object<'js>) -> Error {
    let fields = read_error_object(ctx, obj);
    Error::from_guest(&fields.name, fields.details)
}

struct ErrorFields {
    name: String,
    details: ExceptionDetails,
}

fn read_error_object<'js>(ctx: &Ctx<'js>, obj: &Object<'js>) -> ErrorFields {
    let name = string_property(ctx, obj, "name").unwrap_or_else(|| "Error".to_owned());
    let message = string_property(ctx, obj, "message").unwrap_or_default();
    let stack = string_property(ctx, obj, "stack");
    ErrorFields {
        details: ExceptionDetails::new(message)
            .with_js_name(name.clone())
            .with_stack(stack),
        name,
    }
}

/// A property's guest rendering; missing, undefined and throwing properties read as `None`.
fn string_property<'js>(ctx: &Ctx<'js>, obj: &Object<'js>, key: &str) -> Option<String> {
    let value = match obj.get::<_, Value>(key) {
        Ok(v) => v,
        Err(_) => {
            let _ = ctx.catch();
            return None;
        }
    };
    if value.is_undefined() {
        return None;
    }
    match render(ctx, value) {
        Ok(s) => Some(s),
        Err(_) => {
            let _ = ctx.catch();
            None
        }
    }
}

/// Build the guest error value standing for `error`.
pub(crate) fn host_error_to_guest<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    error: &HostError,
) -> rquickjs::Result<Value<'js>> {
    // a host error that already crossed the guest once keeps its original identity
    let error = match error.downcast_ref::<Error>() {
        Some(Error::Host(original)) => original.clone(),
        _ => error.clone(),
    };
    let (name, register) = match error.downcast_ref::<Error>() {
        Some(Error::Interrupted(_)) => (Some(INTERRUPTED_ERROR_NAME.to_owned()), false),
        Some(e) => (e.js_name().map(str::to_owned), true),
        None => (None, true),
    };

    let obj = Exception::from_message(ctx.clone(), &error.message())?.into_object();
    if let Some(name) = name {
        obj.set("name", name)?;
    }
    obj.set(HOST_CLASS_PROPERTY, error.class_name())?;
    if register {
        let key = registry.register(error, Persistent::save(ctx, obj.clone()));
        // read-only, hidden from enumeration and never reconfigured
        obj.prop(IDENTITY_KEY_PROPERTY, key as f64)?;
    }
    Ok(obj.into_value())
}

/// Turn a host-side failure into a thrown guest exception.
pub(crate) fn throw_into_guest<'js>(
    ctx: &Ctx<'js>,
    registry: &IdentityRegistry,
    error: Error,
) -> rquickjs::Error {
    let host = match error {
        Error::Host(host) => host,
        other => HostError::new(other),
    };
    match host_error_to_guest(ctx, registry, &host) {
        Ok(value) => ctx.throw(value),
        Err(e) => e,
    }
}
