//! TIME1-TIME6 (spec.md §4.4 "TIME1-TIME6"): scaler-driven PINC/DINC
//! sequences with fixed phase offsets relative to TIME1, each capable of
//! requesting an interrupt on overflow.

use super::{dinc, pinc, DincPulse};

/// One 1600pps pulse is 1/1600s; TIME1/3/4/5 PINC once every 16 pulses
/// (10ms), at the listed phase offsets.
const TICKS_PER_PINC: u32 = 16;
const PHASE_TIME3: u32 = 0;
const PHASE_TIME5: u32 = 8;
const PHASE_TIME4: u32 = 12;

/// Interrupts a scaler pulse can request, reported back to the caller so it
/// can route them through the interrupt-vector logic (spec.md §4.5).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerInterrupts {
    pub t3rupt: bool,
    pub t4rupt: bool,
    pub t5rupt: bool,
    pub t6rupt: bool,
}

/// Phase counters for the four independently-clocked timers. TIME1/TIME2
/// form a PINC/carry pair and need no phase state of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timers {
    pulses: u32,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive one scaler pulse (1/1600s). `time1`..`time6` are read/written
    /// in place; `ch13` supplies the TIME6-gate bit (spec.md "ch 13 bit 15").
    /// Returns which interrupts this pulse requested.
    #[allow(clippy::too_many_arguments)]
    pub fn on_scaler_pulse(
        &mut self,
        time1: &mut u16,
        time2: &mut u16,
        time3: &mut u16,
        time4: &mut u16,
        time5: &mut u16,
        time6: &mut u16,
        ch13: &mut u16,
    ) -> TimerInterrupts {
        let mut out = TimerInterrupts::default();
        self.pulses = self.pulses.wrapping_add(1);
        let phase = self.pulses % TICKS_PER_PINC;

        if phase == 0 {
            let (v, overflow) = pinc(*time1);
            *time1 = v;
            if overflow {
                let (v2, _) = pinc(*time2);
                *time2 = v2;
            }
        }
        if phase == PHASE_TIME3 {
            let (v, overflow) = pinc(*time3);
            *time3 = v;
            out.t3rupt = overflow;
        }
        if phase == PHASE_TIME5 {
            let (v, overflow) = pinc(*time5);
            *time5 = v;
            out.t5rupt = overflow;
        }
        if phase == PHASE_TIME4 {
            let (v, overflow) = pinc(*time4);
            *time4 = v;
            out.t4rupt = overflow;
        }

        // TIME6 runs every pulse, but only while ch13 bit14 is set, and a
        // ZOUT clears that bit as it fires the interrupt. Channel writes are
        // masked to 15 bits, so the gate lives at 0o40000, not 0o100000.
        if *ch13 & 0o40000 != 0 {
            let (v, _overflow, pulse) = dinc(*time6);
            *time6 = v;
            if pulse == DincPulse::Zout {
                *ch13 &= !0o40000;
                out.t6rupt = true;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time1_carries_into_time2_on_overflow() {
        let mut timers = Timers::new();
        let (mut t1, mut t2, mut t3, mut t4, mut t5, mut t6, mut ch13) =
            (0o37777u16, 0u16, 0u16, 0u16, 0u16, 0u16, 0u16);
        for _ in 0..TICKS_PER_PINC {
            timers.on_scaler_pulse(&mut t1, &mut t2, &mut t3, &mut t4, &mut t5, &mut t6, &mut ch13);
        }
        assert_eq!(t1, 0);
        assert_eq!(t2, 1);
    }

    #[test]
    fn time6_only_runs_while_gated() {
        let mut timers = Timers::new();
        let (mut t1, mut t2, mut t3, mut t4, mut t5, mut t6, mut ch13) =
            (0u16, 0u16, 0u16, 0u16, 0u16, 5u16, 0u16);
        let out = timers.on_scaler_pulse(&mut t1, &mut t2, &mut t3, &mut t4, &mut t5, &mut t6, &mut ch13);
        assert_eq!(t6, 5);
        assert!(!out.t6rupt);

        ch13 |= 0o40000;
        for _ in 0..5 {
            timers.on_scaler_pulse(&mut t1, &mut t2, &mut t3, &mut t4, &mut t5, &mut t6, &mut ch13);
        }
        // 5 -> 4 -> 3 -> 2 -> 1 -> Zout (fires, clears gate bit).
        assert!(ch13 & 0o40000 == 0);
    }
}
