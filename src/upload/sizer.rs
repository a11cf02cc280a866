//! Segment size schedule.

/// Tracks the size at which the manager cuts the current buffer.
///
/// The threshold starts at the configured segment size and doubles after
/// every `growth_interval` segments, never exceeding `max`. A growth interval
/// of zero keeps the threshold fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSizer {
    threshold: usize,
    max: usize,
    growth_interval: u64,
}

impl SegmentSizer {
    /// Creates a schedule starting at `initial` and capped at `max`.
    pub fn new(initial: usize, max: usize, growth_interval: u64) -> Self {
        Self {
            threshold: initial.min(max),
            max,
            growth_interval,
        }
    }

    /// Size of the next segment.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Upper bound for the threshold.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Records that `segments` segments have been cut so far.
    ///
    /// Returns true when the threshold grew.
    pub fn record_cut(&mut self, segments: u64) -> bool {
        if self.growth_interval == 0 || segments == 0 || segments % self.growth_interval != 0 {
            return false;
        }
        let next = self.threshold.saturating_mul(2).min(self.max);
        let grew = next != self.threshold;
        self.threshold = next;
        grew
    }
}
