//! Per-worker codec visit counters.
//!
//! Workers count locally without synchronization; each worker folds its
//! counters into the process totals once, as it shuts down. Totals therefore
//! only cover workers that have flushed.

use std::{
    cell::RefCell,
    sync::atomic::{AtomicU64, Ordering},
};

/// Codec stages tracked per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode = 0,
    Options = 1,
    Encode = 2,
    Update = 3,
}

pub const STAGE_COUNT: usize = 4;

thread_local! {
    static LOCAL: RefCell<[u64; STAGE_COUNT]> = const { RefCell::new([0; STAGE_COUNT]) };
}

static TOTALS: [AtomicU64; STAGE_COUNT] = [const { AtomicU64::new(0) }; STAGE_COUNT];

/// Bumps the calling worker's counter for `stage`.
#[inline]
pub fn bump(stage: Stage) {
    LOCAL.with(|counters| counters.borrow_mut()[stage as usize] += 1);
}

/// Folds the calling worker's counters into the process totals and resets
/// them. Call once as the worker exits.
pub fn flush() {
    LOCAL.with(|counters| {
        let mut local = counters.borrow_mut();
        for (i, count) in local.iter_mut().enumerate() {
            if *count > 0 {
                TOTALS[i].fetch_add(*count, Ordering::Relaxed);
                *count = 0;
            }
        }
    });
}

/// Process-wide totals, indexed by [`Stage`].
pub fn totals() -> [u64; STAGE_COUNT] {
    let mut out = [0u64; STAGE_COUNT];
    for (i, total) in TOTALS.iter().enumerate() {
        out[i] = total.load(Ordering::Relaxed);
    }
    out
}
