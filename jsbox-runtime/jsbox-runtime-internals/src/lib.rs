//! `jsbox-runtime-internals` bridges a host program and an embedded QuickJS engine: values and
//! errors cross in both directions, host functions are callable from the guest, and every
//! evaluation runs under a deadline measured on a monotonic clock.
//!
//! Most users want the `jsbox-runtime` crate, which re-exports the public surface of this one.

#![deny(bare_trait_objects)]

#[macro_use]
pub mod error;

pub(crate) mod heap;
pub mod host_error;
pub mod hostcall;
pub mod import;
pub mod instance;
pub mod limits;
pub mod log;
pub mod marshal;
pub(crate) mod polyfill;
pub mod registry;
pub mod translate;
pub mod val;
pub mod vmctx;
