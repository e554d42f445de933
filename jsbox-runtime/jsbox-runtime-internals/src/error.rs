use crate::host_error::HostError;
use anyhow::Error as AnyError;
use std::fmt;
use thiserror::Error;

/// Guest error class names that pass through the bridge with their message intact.
pub const NATIVE_ERROR_NAMES: [&str; 7] = [
    "SyntaxError",
    "TypeError",
    "ReferenceError",
    "RangeError",
    "EvalError",
    "URIError",
    "AggregateError",
];

/// Class name the engine uses for internal failures such as interruption and out-of-memory.
pub const ENGINE_INTERNAL_ERROR_NAME: &str = "InternalError";

/// Class name stamped on guest errors that stand for an interrupted host-side computation.
pub const INTERRUPTED_ERROR_NAME: &str = "JsboxInterruptedError";

/// Message reported when the engine's interrupt hook aborts an evaluation.
pub const INTERRUPTED_MESSAGE: &str = "Code evaluation is interrupted by the timeout or something";

/// What is known about a guest exception once it reaches the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionDetails {
    pub message: String,
    /// The guest class name, or `None` when the guest threw something that is not an Error.
    pub js_name: Option<String>,
    pub stack: Option<String>,
}

impl ExceptionDetails {
    pub fn new<M: Into<String>>(message: M) -> Self {
        ExceptionDetails {
            message: message.into(),
            js_name: None,
            stack: None,
        }
    }

    pub fn with_js_name<N: Into<String>>(mut self, js_name: N) -> Self {
        self.js_name = Some(js_name.into());
        self
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }
}

impl fmt::Display for ExceptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// jsbox runtime errors.
///
/// `Runtime` is the root of the taxonomy: every guest exception that does not map to a more
/// specific kind lands there.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", _0)]
    Runtime(ExceptionDetails),

    #[error("{}", _0)]
    Syntax(ExceptionDetails),

    #[error("{}", _0)]
    Type(ExceptionDetails),

    #[error("{}", _0)]
    Reference(ExceptionDetails),

    #[error("{}", _0)]
    Range(ExceptionDetails),

    #[error("{}", _0)]
    Eval(ExceptionDetails),

    #[error("{}", _0)]
    Uri(ExceptionDetails),

    #[error("{}", _0)]
    Aggregate(ExceptionDetails),

    /// The evaluation ran past its deadline.
    #[error("{}", _0)]
    Interrupted(ExceptionDetails),

    /// A pending promise reached the top level of an evaluation.
    #[error("An unawaited Promise was returned to the top-level")]
    NoAwait,

    /// A promise was about to be handed to the host outside the top level.
    #[error(
        "cannot translate a pending computation to host form; resolve it on the guest side first"
    )]
    AsyncValue,

    /// A host function was registered under a name the guest cannot call.
    #[error("Invalid function name: {:?}", _0)]
    InvalidName(String),

    /// A host error that crossed the guest and came back; it is the very object that was raised.
    #[error("{}", _0)]
    Host(HostError),

    /// The engine ran out of memory. The instance is unusable afterwards.
    #[error("Instance limits exceeded: {}", _0)]
    LimitsExceeded(String),

    #[error("Instance faulted on a previous resource-limit violation and must be discarded")]
    Faulted,

    #[error("Instance has been disposed")]
    Disposed,

    #[error("Invalid argument: {}", _0)]
    InvalidArgument(&'static str),

    /// A catch-all for engine failures that are not guest exceptions.
    #[error("Internal error: {}", _0)]
    InternalError(#[source] AnyError),
}

/// The taxonomy of [`Error`] without its payload, for branching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Runtime,
    Syntax,
    Type,
    Reference,
    Range,
    Eval,
    Uri,
    Aggregate,
    Interrupted,
    NoAwait,
    AsyncValue,
    InvalidName,
    Host,
    LimitsExceeded,
    Faulted,
    Disposed,
    InvalidArgument,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::Type(_) => ErrorKind::Type,
            Error::Reference(_) => ErrorKind::Reference,
            Error::Range(_) => ErrorKind::Range,
            Error::Eval(_) => ErrorKind::Eval,
            Error::Uri(_) => ErrorKind::Uri,
            Error::Aggregate(_) => ErrorKind::Aggregate,
            Error::Interrupted(_) => ErrorKind::Interrupted,
            Error::NoAwait => ErrorKind::NoAwait,
            Error::AsyncValue => ErrorKind::AsyncValue,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::Host(_) => ErrorKind::Host,
            Error::LimitsExceeded(_) => ErrorKind::LimitsExceeded,
            Error::Faulted => ErrorKind::Faulted,
            Error::Disposed => ErrorKind::Disposed,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Details of the guest exception behind this error, if it came from one.
    pub fn details(&self) -> Option<&ExceptionDetails> {
        match self {
            Error::Runtime(d)
            | Error::Syntax(d)
            | Error::Type(d)
            | Error::Reference(d)
            | Error::Range(d)
            | Error::Eval(d)
            | Error::Uri(d)
            | Error::Aggregate(d)
            | Error::Interrupted(d) => Some(d),
            _ => None,
        }
    }

    /// The guest class name of the exception behind this error.
    pub fn js_name(&self) -> Option<&str> {
        self.details().and_then(|d| d.js_name.as_deref())
    }

    /// Build the error for a guest exception of class `name`.
    ///
    /// Only the name-based rules apply here; identity lookup happens before this is reached.
    pub fn from_guest(name: &str, details: ExceptionDetails) -> Error {
        match name {
            "SyntaxError" => Error::Syntax(details),
            "TypeError" => Error::Type(details),
            "ReferenceError" => Error::Reference(details),
            "RangeError" => Error::Range(details),
            "EvalError" => Error::Eval(details),
            "URIError" => Error::Uri(details),
            "AggregateError" => Error::Aggregate(details),
            ENGINE_INTERNAL_ERROR_NAME if details.message.contains("interrupted") => {
                Error::Interrupted(ExceptionDetails {
                    message: INTERRUPTED_MESSAGE.to_owned(),
                    ..details
                })
            }
            INTERRUPTED_ERROR_NAME => Error::Interrupted(details),
            _ => Error::Runtime(details),
        }
    }

    pub(crate) fn interrupted() -> Error {
        Error::Interrupted(
            ExceptionDetails::new(INTERRUPTED_MESSAGE).with_js_name(ENGINE_INTERNAL_ERROR_NAME),
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::InternalError(e.into())
    }
}

#[macro_export]
macro_rules! jsbox_bail {
    ($e:expr) => {
        return Err(jsbox_format_err!($e));
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(jsbox_format_err!($fmt, $($arg)*));
    };
}

#[macro_export(local_inner_macros)]
macro_rules! jsbox_ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            jsbox_bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            jsbox_bail!($fmt, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! jsbox_format_err {
    ($($arg:tt)*) => { $crate::error::Error::InternalError(anyhow::format_err!($($arg)*)) }
}
