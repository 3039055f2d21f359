//! Channel-specific behavior layered over the raw 512-word channel array
//! (spec.md §6 "I/O-channel boundary", §4.4 "DSKY lamp aggregation").
//!
//! The bit assignments for the ch 77 alarm-code box are an internal
//! convention (see `DESIGN.md` "Open-question decisions") — the filtered
//! reference source never carried the header that `#define`s them, only
//! their use sites. What's load-bearing is that each alarm owns a distinct
//! bit, writing ch77 clears all of them except a mid-assertion Night
//! Watchman, and the bits read back through `EngineMemory::channels`.
use bitflags::bitflags;

bitflags! {
    pub struct Ch77: u16 {
        const NIGHT_WATCHMAN = 0o1;
        const RUPT_LOCK      = 0o2;
        const TC_TRAP        = 0o4;
        const PARITY_FAIL    = 0o10;
    }
}

pub const CH_SUPERBANK: u16 = 7;
pub const CH_LAMP_MATRIX: u16 = 10;
pub const CH_KEYBOARD_A: u16 = 15;
pub const CH_KEYBOARD_B: u16 = 16;
pub const CH_DOWNLINK_A: u16 = 34;
pub const CH_DOWNLINK_B: u16 = 35;
pub const CH_ALARM_BOX: u16 = 0o77;
pub const CH_LAMPS: u16 = 0o163;
pub const CH_UPRUPT: u16 = 0o173;
pub const CH_IMU_X: u16 = 0o174;
pub const CH_IMU_Y: u16 = 0o175;
pub const CH_IMU_Z: u16 = 0o176;
pub const CH_GYRO: u16 = 0o177;
pub const CH_RHC_X: u16 = 0o166;
pub const CH_RHC_Y: u16 = 0o167;
pub const CH_RHC_Z: u16 = 0o170;

/// Clear RESTART when the keyboard channels (15/16) receive this code.
pub const KEYCODE_CLEAR_RESTART: u16 = 0o22;

/// Channels 30-33 are "write 1 to clear" latched discretes: the value
/// written is treated as a clear-mask, not a replacement.
pub fn apply_latched_discrete_clear(current: u16, written_mask: u16) -> u16 {
    current & !written_mask
}

/// ch7 only exposes bits 5-7 (superbank + lamp-test latch group) to writes;
/// the rest of the word is left untouched.
pub fn apply_ch7_write(current: u16, written: u16) -> u16 {
    const WRITABLE: u16 = 0o340;
    (current & !WRITABLE) | (written & WRITABLE)
}

/// Decode a channel-10 lamp-matrix write into its row index and payload.
pub fn decode_lamp_row(value: u16) -> (usize, u16) {
    let row = ((value >> 11) & 0o17) as usize;
    let payload = value & 0o3777;
    (row, payload)
}

/// The linear AGC-warning filter driving the flashing WARNING lamp
/// (spec.md §4.4 "DSKY lamp aggregation"): integrates toward 140000 while a
/// warning source is active, decays by 15 every 160ms otherwise, clamped to
/// [0, 140000], with a lamp-on threshold of 20000.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarningFilter {
    level: i32,
}

const WARNING_MAX: i32 = 0o140000;
const WARNING_THRESHOLD: i32 = 0o20000;
const WARNING_RISE: i32 = 0o15000;
const WARNING_DECAY: i32 = 0o15;

impl WarningFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step the filter once per 160ms tick.
    pub fn tick(&mut self, warning_active: bool) {
        self.level += if warning_active { WARNING_RISE } else { -WARNING_DECAY };
        self.level = self.level.clamp(0, WARNING_MAX);
    }

    pub fn lamp_on(&self) -> bool {
        self.level >= WARNING_THRESHOLD
    }
}

/// A 1.28s-period, 75%-duty flasher used by several DSKY lamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flasher {
    phase_ticks: u32,
}

/// Flasher period in 160ms ticks (1.28s / 160ms).
const FLASH_PERIOD_TICKS: u32 = 8;
/// Ticks lit out of the period (75% duty).
const FLASH_ON_TICKS: u32 = 6;

impl Flasher {
    pub fn tick(&mut self) -> bool {
        let lit = self.phase_ticks < FLASH_ON_TICKS;
        self.phase_ticks = (self.phase_ticks + 1) % FLASH_PERIOD_TICKS;
        lit
    }
}

/// Inputs to [`aggregate_lamp_word`], named after the ch163 bit sources
/// listed in spec.md §4.4.
pub struct LampInputs {
    pub light_test: bool,
    pub standby: bool,
    pub restart: bool,
    pub temp: bool,
    pub key_rel: bool,
    pub oper_err: bool,
    pub vn_flash: bool,
    pub warning_lit: bool,
}

/// Compose the ch163 aggregated lamp word. Bit positions are an internal
/// convention consistent across this crate (see ch77, `mem::registers`):
/// each named condition owns a distinct bit.
pub fn aggregate_lamp_word(inputs: &LampInputs) -> u16 {
    let mut word = 0u16;
    word |= (inputs.light_test as u16) << 0;
    word |= (inputs.standby as u16) << 1;
    word |= (inputs.restart as u16) << 2;
    word |= (inputs.temp as u16) << 3;
    word |= (inputs.key_rel as u16) << 4;
    word |= (inputs.oper_err as u16) << 5;
    word |= (inputs.vn_flash as u16) << 6;
    word |= (inputs.warning_lit as u16) << 7;
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ch7_write_only_touches_bits_5_through_7() {
        let current = 0o123;
        let next = apply_ch7_write(current, 0o777);
        assert_eq!(next, (current & !0o340) | 0o340);
    }

    #[test]
    fn latched_discrete_clear_masks_out_written_bits() {
        assert_eq!(apply_latched_discrete_clear(0o17, 0o5), 0o12);
    }

    #[test]
    fn lamp_row_decode_splits_row_and_payload() {
        let (row, payload) = decode_lamp_row(0o17777);
        assert_eq!(row, 0o17);
        assert_eq!(payload, 0o3777);
    }

    #[test]
    fn warning_filter_rises_and_decays() {
        let mut w = WarningFilter::new();
        assert!(!w.lamp_on());
        w.tick(true);
        assert!(w.lamp_on());
        for _ in 0..2000 {
            w.tick(false);
        }
        assert!(!w.lamp_on());
    }

    #[test]
    fn flasher_has_75_percent_duty() {
        let mut f = Flasher::default();
        let lit = (0..FLASH_PERIOD_TICKS).filter(|_| f.tick()).count() as u32;
        assert_eq!(lit, FLASH_ON_TICKS);
    }
}
