use std::fmt;

/// The lifecycle state of an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// The instance can evaluate code.
    Ready,
    /// The engine hit a resource limit it cannot recover from. Only disposal remains.
    Faulted { reason: String },
    /// The engine runtime and context are gone.
    Disposed,
}

impl State {
    pub fn is_ready(&self) -> bool {
        matches!(self, State::Ready)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, State::Faulted { .. })
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, State::Disposed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Ready => write!(f, "ready"),
            State::Faulted { reason } => write!(f, "faulted ({})", reason),
            State::Disposed => write!(f, "disposed"),
        }
    }
}
