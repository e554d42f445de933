//! Opt-in guest globals, selected by [`Features`](../limits/struct.Features.html).

pub(crate) mod base64;
pub(crate) mod file;
pub(crate) mod intl;
pub(crate) mod timers;

use crate::instance::InstanceInner;
use crate::limits::Features;
use rquickjs::Ctx;
use std::rc::Rc;

pub(crate) fn install<'js>(ctx: &Ctx<'js>, inner: &Rc<InstanceInner>) -> rquickjs::Result<()> {
    let features = inner.limits.features;
    if features.contains(Features::TIMERS) {
        timers::install(ctx, inner)?;
    }
    if features.contains(Features::BASE64) {
        base64::install(ctx)?;
    }
    if features.contains(Features::INTL) {
        intl::install(ctx)?;
    }
    if features.contains(Features::FILE) {
        file::install(ctx)?;
    }
    tracing::debug!(?features, "guest features installed");
    Ok(())
}
