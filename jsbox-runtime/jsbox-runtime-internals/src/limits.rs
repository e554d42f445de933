use crate::error::Error;
use bitflags::bitflags;
use std::time::Duration;

bitflags! {
    /// Opt-in guest capabilities. Each flag only adds globals; none changes default behavior.
    pub struct Features: u32 {
        /// `setTimeout` and `clearTimeout`, driven by the drain step of each evaluation.
        const TIMERS = 0b01;
        /// The HTML `btoa` and `atob` functions.
        const BASE64 = 0b10;
        /// An `Intl` namespace with `en-US` number, plural and date formatting.
        const INTL = 0b100;
        /// `Blob`, `File` and `FileReader` over in-memory bytes.
        const FILE = 0b1000;
    }
}

const FEATURE_NAMES: [(&str, Features); 4] = [
    ("timers", Features::TIMERS),
    ("base64", Features::BASE64),
    ("intl", Features::INTL),
    ("file", Features::FILE),
];

impl Features {
    /// Look up a feature by its configuration identifier.
    pub fn from_name(name: &str) -> Option<Features> {
        FEATURE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }
}

impl Default for Features {
    fn default() -> Features {
        Features::empty()
    }
}

/// Resource limits and capabilities of an [`Instance`](../instance/struct.Instance.html).
///
/// The stack ceiling is passed straight to the engine. The heap cap is enforced by the allocator
/// the engine runs on, and the timeout by the interrupt governor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Cap on the engine heap, in bytes. (default 128M)
    ///
    /// Running out of this memory faults the instance for good.
    pub memory_limit: usize,
    /// Ceiling on the guest call stack, in bytes. (default 4M)
    pub max_stack_size: usize,
    /// Time an evaluation may take, measured on a monotonic clock. (default 100ms)
    pub timeout: Duration,
    pub features: Features,
}

impl Limits {
    pub const fn default() -> Limits {
        Limits {
            memory_limit: 128 * 1024 * 1024,
            max_stack_size: 4 * 1024 * 1024,
            timeout: Duration::from_millis(100),
            features: Features::empty(),
        }
    }

    pub const fn with_memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    pub const fn with_max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.memory_limit == 0 {
            return Err(Error::InvalidArgument("memory limit must be greater than 0"));
        }
        if self.max_stack_size == 0 {
            return Err(Error::InvalidArgument("stack size must be greater than 0"));
        }
        if self.max_stack_size >= self.memory_limit {
            return Err(Error::InvalidArgument(
                "stack size must be smaller than the memory limit",
            ));
        }
        if self.timeout == Duration::from_millis(0) {
            return Err(Error::InvalidArgument("timeout must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits::default()
    }
}
