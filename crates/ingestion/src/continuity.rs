//! Frame sequence continuity checks.

/// Outcome of checking one sequence number against its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityResult {
    /// No predecessor; any sequence number is accepted
    FirstFrame,
    /// Exactly one past the predecessor
    Continuous,
    /// Anything else, including repeats and backwards jumps
    Gap { expected: u64, actual: u64 },
}

impl ContinuityResult {
    #[inline]
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// Check `current` against the previously accepted sequence number.
pub fn check(previous: Option<u64>, current: u64) -> ContinuityResult {
    match previous {
        None => ContinuityResult::FirstFrame,
        Some(prev) => {
            let expected = prev.wrapping_add(1);
            if current == expected {
                ContinuityResult::Continuous
            } else {
                ContinuityResult::Gap {
                    expected,
                    actual: current,
                }
            }
        }
    }
}

/// Stateful guard remembering the last accepted sequence number
#[derive(Debug, Clone, Default)]
pub struct ContinuityGuard {
    last: Option<u64>,
}

impl ContinuityGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and, unless it is a gap, accept `sequence`
    pub fn observe(&mut self, sequence: u64) -> ContinuityResult {
        let result = check(self.last, sequence);
        if !result.is_gap() {
            self.last = Some(sequence);
        }
        result
    }

    /// Last accepted sequence number
    pub fn last_sequence(&self) -> Option<u64> {
        self.last
    }
}
