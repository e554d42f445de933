//! Accounting for the engine heap.
//!
//! The engine allocates through a [`MeteredAllocator`], which refuses any request that would take
//! the heap past `Limits::memory_limit`. A refusal trips the shared [`HeapMeter`], so the instance
//! can tell an exhausted heap apart from a guest that merely throws an error claiming one.

use rquickjs::allocator::{Allocator, RawMemPtr, RustAllocator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set once the engine has been refused memory.
#[derive(Clone, Debug, Default)]
pub(crate) struct HeapMeter(Arc<AtomicBool>);

impl HeapMeter {
    pub(crate) fn is_exhausted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn trip(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            tracing::warn!("engine heap exhausted");
        }
    }
}

pub(crate) struct MeteredAllocator {
    used: usize,
    limit: usize,
    meter: HeapMeter,
}

impl MeteredAllocator {
    pub(crate) fn new(limit: usize, meter: HeapMeter) -> MeteredAllocator {
        MeteredAllocator {
            used: 0,
            limit,
            meter,
        }
    }

    fn admits(&self, released: usize, requested: usize) -> bool {
        match (self.used - released).checked_add(requested) {
            Some(total) => total <= self.limit,
            None => false,
        }
    }
}

unsafe impl Allocator for MeteredAllocator {
    fn alloc(&mut self, size: usize) -> RawMemPtr {
        if !self.admits(0, size) {
            self.meter.trip();
            return std::ptr::null_mut();
        }
        let ptr = RustAllocator.alloc(size);
        if ptr.is_null() {
            self.meter.trip();
            return ptr;
        }
        self.used += unsafe { RustAllocator::usable_size(ptr) };
        ptr
    }

    unsafe fn dealloc(&mut self, ptr: RawMemPtr) {
        self.used -= RustAllocator::usable_size(ptr);
        RustAllocator.dealloc(ptr);
    }

    unsafe fn realloc(&mut self, ptr: RawMemPtr, new_size: usize) -> RawMemPtr {
        let old_size = RustAllocator::usable_size(ptr);
        if !self.admits(old_size, new_size) {
            self.meter.trip();
            return std::ptr::null_mut();
        }
        let new_ptr = RustAllocator.realloc(ptr, new_size);
        if new_ptr.is_null() {
            self.meter.trip();
            return new_ptr;
        }
        self.used = self.used - old_size + RustAllocator::usable_size(new_ptr);
        new_ptr
    }

    unsafe fn usable_size(ptr: RawMemPtr) -> usize {
        RustAllocator::usable_size(ptr)
    }
}
