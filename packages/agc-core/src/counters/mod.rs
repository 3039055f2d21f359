//! Unprogrammed counter increments (spec.md §4.3), the scaler, the CDU
//! input FIFOs, and the other hardware-clocked sequencers that poke erasable
//! memory without going through the instruction engine.

pub mod bursts;
pub mod cdu_fifo;
pub mod downrupt;
pub mod handrupt;
pub mod radar;
pub mod scaler;
pub mod timers;

use crate::alu::{add_sp16, sign_extend, value_ovf, AGC_M0, AGC_M1, AGC_P0, AGC_P1};

/// 1's-complement increment (PINC). Returns true on overflow (counter was
/// already at max positive and wraps to +0).
pub fn pinc(counter: u16) -> (u16, bool) {
    if counter == 0o37777 {
        (AGC_P0, true)
    } else {
        let mut i = (counter.wrapping_add(1)) & 0o77777;
        if i == AGC_P0 {
            i += 1;
        }
        (i, false)
    }
}

/// 1's-complement decrement, applied only to negative counters (MINC).
pub fn minc(counter: u16) -> (u16, bool) {
    if counter == 0o40000 {
        (AGC_M0, true)
    } else {
        let mut i = (counter.wrapping_sub(1)) & 0o77777;
        if i == AGC_M0 {
            i -= 1;
        }
        (i, false)
    }
}

/// 2's-complement increment (PCDU).
pub fn pcdu(counter: u16) -> (u16, bool) {
    let overflow = counter == 0o77777;
    let i = counter.wrapping_add(1) & 0o77777;
    (i, overflow)
}

/// 2's-complement decrement (MCDU).
pub fn mcdu(counter: u16) -> (u16, bool) {
    let overflow = counter == 0;
    let i = counter.wrapping_sub(1) & 0o77777;
    (i, overflow)
}

/// The output pulse a DINC sequence emits on the counter's channel, if any
/// (spec.md §4.3 "DINC" — ZOUT/MOUT/POUT pulses feed PIPA-style hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DincPulse {
    Zout,
    Mout,
    Pout,
}

/// Diminish increment (DINC): moves a counter one step toward zero, one
/// step per call, pulsing the relevant readout line.
pub fn dinc(counter: u16) -> (u16, bool, DincPulse) {
    if counter == AGC_P0 || counter == AGC_M0 {
        (counter, true, DincPulse::Zout)
    } else if counter & 0o40000 != 0 {
        let i = add_sp16(sign_extend(counter), sign_extend(AGC_P1)) & 0o77777;
        (i, false, DincPulse::Mout)
    } else {
        let i = add_sp16(sign_extend(counter), sign_extend(AGC_M1)) & 0o77777;
        (i, false, DincPulse::Pout)
    }
}

/// Left-shift increment (SHINC).
pub fn shinc(counter: u16) -> (u16, bool) {
    let overflow = counter & 0o20000 != 0;
    let i = (counter << 1) & 0o37777;
    (i, overflow)
}

/// Left-shift-and-add increment (SHANC).
pub fn shanc(counter: u16) -> (u16, bool) {
    let overflow = counter & 0o20000 != 0;
    let i = ((counter << 1) + 1) & 0o37777;
    (i, overflow)
}

/// Whether a just-written counter value represents overflow worth raising
/// an interrupt request for (TIME1/3/4/5 wiring, spec.md §4.3 "Interrupt
/// requests from counters"). `sum` is the 16-bit sum the counter update
/// produced before masking.
pub fn counter_caused_interrupt(sum: u16) -> bool {
    value_ovf(sum) != AGC_P0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinc_overflows_from_max_positive() {
        assert_eq!(pinc(0o37777), (AGC_P0, true));
    }

    #[test]
    fn pinc_from_minus_one_lands_on_minus_zero() {
        // 0o77776 is -1; plain one's-complement addition lands on 0o77777
        // (-0), not +0, so PINC does not need to bump past it here.
        assert_eq!(pinc(0o77776), (0o77777, false));
    }

    #[test]
    fn minc_overflows_from_max_negative() {
        assert_eq!(minc(0o40000), (AGC_M0, true));
    }

    #[test]
    fn dinc_pulses_zout_at_either_zero() {
        assert_eq!(dinc(AGC_P0).1, true);
        assert_eq!(dinc(AGC_P0).2, DincPulse::Zout);
        assert_eq!(dinc(AGC_M0).2, DincPulse::Zout);
    }

    #[test]
    fn dinc_steps_toward_zero() {
        let (v, ovf, pulse) = dinc(5);
        assert_eq!(ovf, false);
        assert_eq!(pulse, DincPulse::Pout);
        assert_eq!(v, 4);
    }

    #[test]
    fn shinc_overflows_on_high_bit() {
        assert_eq!(shinc(0o20000).1, true);
        assert_eq!(shinc(1), (2, false));
    }
}
