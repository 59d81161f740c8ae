//! Two-slot alternation for multi-pass kernels.

/// A pair of scratch targets written alternately by successive passes.
///
/// Pass `n` writes `written_by(n)` and pass `n + 1` reads it back, so the
/// parity bookkeeping lives in one place for both the transform stages and
/// the reduction levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong<T> {
    slots: [T; 2],
}

impl<T: Copy> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
        }
    }

    /// Slot written by pass `pass`.
    pub fn written_by(&self, pass: usize) -> T {
        self.slots[pass % 2]
    }

    pub fn slots(&self) -> [T; 2] {
        self.slots
    }
}
