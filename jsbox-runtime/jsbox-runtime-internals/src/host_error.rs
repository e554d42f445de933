use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// An exception raised on the host side of the bridge.
///
/// `HostError` is what host functions return on failure, and what comes back out of
/// [`Instance::eval`](../instance/struct.Instance.html#method.eval) when that failure was never
/// caught by the guest. Clones share the same underlying error, so identity survives a trip
/// through the guest and can be checked with [`HostError::ptr_eq`].
///
/// Any `std::error::Error` converts into a `HostError` with `?`. For that reason `HostError` does
/// not implement `std::error::Error` itself.
#[derive(Clone)]
pub struct HostError {
    inner: Rc<dyn StdError + 'static>,
    class_name: &'static str,
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MessageError {}

impl HostError {
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        HostError {
            inner: Rc::new(error),
            class_name: short_type_name(std::any::type_name::<E>()),
        }
    }

    /// A plain error carrying only a message, with the class name `Error`.
    pub fn msg<M: Into<String>>(message: M) -> Self {
        HostError {
            inner: Rc::new(MessageError(message.into())),
            class_name: "Error",
        }
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// The unqualified name of the wrapped error type.
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn ptr_eq(&self, other: &HostError) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn as_error(&self) -> &(dyn StdError + 'static) {
        &*self.inner
    }
}

impl<E: StdError + 'static> From<E> for HostError {
    fn from(error: E) -> Self {
        HostError::new(error)
    }
}

impl fmt::Debug for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostError")
            .field("class_name", &self.class_name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
