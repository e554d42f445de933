//! `setTimeout` and `clearTimeout` without an event loop.
//!
//! Timers wait in a host-side queue. The drain step of an evaluation runs them in due order once
//! the job queue is empty, sleeping on the calling thread until the next one is due. No timer
//! outlives the evaluation's deadline: waiting past it fails the evaluation as interrupted.

use crate::error::Error;
use crate::instance::InstanceInner;
use crate::translate;
use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Persistent, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

struct Timer {
    id: u32,
    due: Instant,
    callback: Persistent<Function<'static>>,
}

/// Pending timers of one instance.
#[derive(Default)]
pub(crate) struct TimerQueue {
    next_id: Cell<u32>,
    timers: RefCell<Vec<Timer>>,
}

impl TimerQueue {
    fn schedule(&self, delay: Duration, callback: Persistent<Function<'static>>) -> u32 {
        let id = self.next_id.get().wrapping_add(1).max(1);
        self.next_id.set(id);
        let now = Instant::now();
        let due = now.checked_add(delay).unwrap_or(now);
        self.timers.borrow_mut().push(Timer { id, due, callback });
        id
    }

    fn cancel(&self, id: u32) {
        self.timers.borrow_mut().retain(|t| t.id != id);
    }

    fn pop_next(&self) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let next = timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        Some(timers.remove(next))
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Drops every pending callback. Must run while the engine runtime is still alive.
    pub(crate) fn clear(&self) {
        self.timers.borrow_mut().clear();
    }
}

/// Longest delay a timer can ask for, the largest signed 32-bit millisecond count.
const MAX_DELAY_MS: f64 = 2_147_483_647.0;

fn delay_from_guest(ms: Option<f64>) -> Duration {
    match ms {
        Some(ms) if ms > 0.0 => Duration::from_micros((ms.min(MAX_DELAY_MS) * 1000.0) as u64),
        _ => Duration::from_millis(0),
    }
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, inner: &Rc<InstanceInner>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let bridge = inner.clone();
    globals.set(
        "setTimeout",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<f64>| -> u32 {
                let callback = Persistent::save(&ctx, callback);
                bridge.timers.schedule(delay_from_guest(delay.0), callback)
            },
        )?,
    )?;

    let bridge = inner.clone();
    globals.set(
        "clearTimeout",
        Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
            if let Some(id) = id.0.as_ref().and_then(Value::as_number) {
                if id.fract() == 0.0 && id >= 1.0 && id <= f64::from(u32::MAX) {
                    bridge.timers.cancel(id as u32);
                }
            }
        })?,
    )?;
    Ok(())
}

/// Run the next pending timer. Returns `false` when there is none.
pub(crate) fn run_next<'js>(ctx: &Ctx<'js>, inner: &InstanceInner) -> Result<bool, Error> {
    let timer = match inner.timers.pop_next() {
        Some(timer) => timer,
        None => return Ok(false),
    };

    let now = Instant::now();
    if timer.due > now {
        let wait = timer.due - now;
        if let Some(remaining) = inner.governor.remaining() {
            if wait >= remaining {
                tracing::debug!(timer = timer.id, "next timer is due after the deadline");
                thread::sleep(remaining);
                return Err(Error::interrupted());
            }
        }
        thread::sleep(wait);
    }

    let callback = timer
        .callback
        .restore(ctx)
        .map_err(|e| translate::from_js_error(ctx, &inner.registry, Some(&inner.sink), e))?;
    callback
        .call::<_, ()>(())
        .map_err(|e| translate::from_js_error(ctx, &inner.registry, Some(&inner.sink), e))?;
    Ok(true)
}
