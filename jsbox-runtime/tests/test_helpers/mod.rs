use jsbox_runtime::{Features, Instance, Limits};
use lazy_static::lazy_static;
use std::sync::RwLock;
use std::time::Duration;

lazy_static! {
    static ref EXCLUSIVE_TEST: RwLock<()> = RwLock::default();
}

/// Run a test non-exclusively with other `test_nonex` tests.
#[allow(dead_code)]
pub fn test_nonex<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let lock = EXCLUSIVE_TEST.read().unwrap_or_else(|e| e.into_inner());
    let r = f();
    drop(lock);
    r
}

/// Run a test exclusively, so that no other `test_nonex` or `test_ex` tests will run concurrently.
///
/// This function _must_ wrap any test that measures wall-clock time.
#[allow(dead_code)]
pub fn test_ex<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let lock = EXCLUSIVE_TEST.write().unwrap_or_else(|e| e.into_inner());
    let r = f();
    drop(lock);
    r
}

/// Limits that leave plenty of time, so that only tests about the deadline ever hit it.
///
/// The guest stack stays well inside the 2M stack of a test thread.
#[allow(dead_code)]
pub fn relaxed_limits() -> Limits {
    Limits::default()
        .with_timeout(Duration::from_secs(5))
        .with_max_stack_size(512 * 1024)
}

#[allow(dead_code)]
pub fn new_instance() -> Instance {
    init_tracing();
    Instance::new(relaxed_limits()).expect("instance can be created")
}

#[allow(dead_code)]
pub fn instance_with(limits: Limits) -> Instance {
    init_tracing();
    Instance::new(limits).expect("instance can be created")
}

#[allow(dead_code)]
pub fn instance_with_features(features: Features) -> Instance {
    instance_with(relaxed_limits().with_features(features))
}

/// Route `tracing` output through the test harness, so it only shows for failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
