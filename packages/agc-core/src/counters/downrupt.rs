//! Downlink telemetry interrupt scheduling (spec.md §4.3 "Downrupt").
//! Channels 34 and 35 each latch a "half written" flag; once both halves of
//! a downlink word are written, DOWNRUPT is scheduled a fixed delay later
//! rather than firing immediately.

/// Cycles between a downlink word completing and DOWNRUPT firing:
/// `AGC_PER_SECOND / 50` (spec.md §4.3).
pub const DOWNRUPT_DELAY_DIVISOR: u64 = 50;

#[derive(Debug, Default, Clone, Copy)]
pub struct DownruptLatch {
    ch34_written: bool,
    ch35_written: bool,
    scheduled_at: Option<u64>,
}

impl DownruptLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write to channel 34 or 35. Call with `channel` equal to 34
    /// or 35; other values are ignored.
    pub fn note_write(&mut self, channel: u16, now: u64, agc_per_second: u64) {
        match channel {
            34 => self.ch34_written = true,
            35 => self.ch35_written = true,
            _ => return,
        }
        if self.ch34_written && self.ch35_written {
            self.scheduled_at = Some(now + agc_per_second / DOWNRUPT_DELAY_DIVISOR);
            self.ch34_written = false;
            self.ch35_written = false;
        }
    }

    /// Check whether a scheduled DOWNRUPT is due; consumes it if so.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.scheduled_at {
            Some(at) if now >= at => {
                self.scheduled_at = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_both_halves_written() {
        let mut latch = DownruptLatch::new();
        latch.note_write(34, 0, 1000);
        assert!(!latch.poll(10_000));
        latch.note_write(35, 0, 1000);
        assert!(!latch.poll(0));
        assert!(latch.poll(20));
    }
}
