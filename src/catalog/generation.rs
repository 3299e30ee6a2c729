//! Process-wide generation counter
//!
//! Every (re)parse of a definition file is stamped with a fresh generation. Results computed against an older
//! stamp are stale and get discarded. The counter only increases and restarts with the process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A parse stamp. `Generation::NONE` marks a file that was never parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub const NONE: Generation = Generation(0);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hand out the next generation. Strictly greater than every previously returned value.
pub fn next_generation() -> Generation {
    Generation(COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
}
