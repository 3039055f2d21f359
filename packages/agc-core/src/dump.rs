//! Optional core-dump loading (spec.md §6 "Core-dump format"): a whitespace-
//! separated sequence of octal words — 512 channel values, 8×256 erasable
//! words, then a fixed block of runtime flags.

use crate::error::DumpLoadError;
use crate::mem::map::{ERASABLE_BANKS, ERASABLE_BANK_WORDS};
use crate::mem::NUM_CHANNELS;
use crate::mem::EngineMemory;

const CHANNEL_10_ROWS: usize = 16;
const INTERRUPT_REQUEST_COUNT: usize = 11;

/// Everything after the channel/erasable blocks: per-cycle engine state a
/// host wants to resume from rather than re-derive.
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    pub cycle_counter: u64,
    pub extra_code: bool,
    pub allow_interrupt: bool,
    pub pend_flag: bool,
    pub pend_delay: u8,
    pub extra_delay: u8,
    pub output_channel_7: u16,
    pub channel_10_rows: [u16; CHANNEL_10_ROWS],
    pub index_value: u16,
    pub interrupt_requests: [bool; INTERRUPT_REQUEST_COUNT],
    pub in_isr: bool,
    pub substitute_instruction: bool,
    pub downrupt_time_valid: bool,
    pub downrupt_time: u64,
    pub downlink: u16,
}

/// A fully parsed core-dump.
#[derive(Debug, Clone)]
pub struct DumpImage {
    pub channels: [u16; NUM_CHANNELS],
    pub erasable: [[u16; ERASABLE_BANK_WORDS]; ERASABLE_BANKS],
    pub runtime: RuntimeFlags,
}

struct TokenCursor<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    consumed: usize,
}

impl<'a> TokenCursor<'a> {
    fn new(text: &'a str) -> Self {
        TokenCursor { tokens: text.split_whitespace(), consumed: 0 }
    }

    fn next_raw(&mut self) -> Result<&'a str, DumpLoadError> {
        match self.tokens.next() {
            Some(tok) => {
                self.consumed += 1;
                Ok(tok)
            }
            None => Err(DumpLoadError::Truncated { expected: self.consumed + 1, found: self.consumed }),
        }
    }

    fn next_u32(&mut self) -> Result<u32, DumpLoadError> {
        let tok = self.next_raw()?;
        u32::from_str_radix(tok, 8).map_err(|_| DumpLoadError::BadOctal(tok.to_string()))
    }

    fn next_u16(&mut self) -> Result<u16, DumpLoadError> {
        Ok((self.next_u32()? & 0xFFFF) as u16)
    }

    fn next_u64(&mut self) -> Result<u64, DumpLoadError> {
        let tok = self.next_raw()?;
        u64::from_str_radix(tok, 8).map_err(|_| DumpLoadError::BadOctal(tok.to_string()))
    }

    fn next_bool(&mut self) -> Result<bool, DumpLoadError> {
        Ok(self.next_u32()? != 0)
    }
}

/// Parse a core-dump from its textual form.
pub fn parse_dump(text: &str) -> Result<DumpImage, DumpLoadError> {
    let mut cursor = TokenCursor::new(text);

    let mut channels = [0u16; NUM_CHANNELS];
    for slot in channels.iter_mut() {
        *slot = cursor.next_u16()?;
    }

    let mut erasable = [[0u16; ERASABLE_BANK_WORDS]; ERASABLE_BANKS];
    for bank in erasable.iter_mut() {
        for slot in bank.iter_mut() {
            *slot = cursor.next_u16()?;
        }
    }

    let cycle_counter = cursor.next_u64()?;
    let extra_code = cursor.next_bool()?;
    let allow_interrupt = cursor.next_bool()?;
    let pend_flag = cursor.next_bool()?;
    let pend_delay = (cursor.next_u32()? & 0xFF) as u8;
    let extra_delay = (cursor.next_u32()? & 0xFF) as u8;
    let output_channel_7 = cursor.next_u16()?;

    let mut channel_10_rows = [0u16; CHANNEL_10_ROWS];
    for slot in channel_10_rows.iter_mut() {
        *slot = cursor.next_u16()?;
    }

    let index_value = cursor.next_u16()?;

    let mut interrupt_requests = [false; INTERRUPT_REQUEST_COUNT];
    for slot in interrupt_requests.iter_mut() {
        *slot = cursor.next_bool()?;
    }

    let in_isr = cursor.next_bool()?;
    let substitute_instruction = cursor.next_bool()?;
    let downrupt_time_valid = cursor.next_bool()?;
    let downrupt_time = cursor.next_u64()?;
    let downlink = cursor.next_u16()?;

    Ok(DumpImage {
        channels,
        erasable,
        runtime: RuntimeFlags {
            cycle_counter,
            extra_code,
            allow_interrupt,
            pend_flag,
            pend_delay,
            extra_delay,
            output_channel_7,
            channel_10_rows,
            index_value,
            interrupt_requests,
            in_isr,
            substitute_instruction,
            downrupt_time_valid,
            downrupt_time,
            downlink,
        },
    })
}

/// Apply a parsed dump's memory contents. In "load erasable only" mode,
/// only erasable banks 1-7 and bank-0 addresses ≥ 010 are overwritten — the
/// register file's named low cells (A/L/Q/EB/FB/Z/BB/ZERO, addresses 0-7)
/// are left alone, matching spec.md §6.
pub fn apply_to_memory(mem: &mut EngineMemory, dump: &DumpImage, erasable_only: bool) {
    if !erasable_only {
        mem.channels = dump.channels;
    }
    for (bank, words) in dump.erasable.iter().enumerate() {
        if bank == 0 {
            let mut bank0 = *mem.erasable_bank(0);
            let start = if erasable_only { 0o10 } else { 0 };
            bank0[start..].copy_from_slice(&words[start..]);
            mem.load_erasable_bank(0, &bank0);
        } else {
            mem.load_erasable_bank(bank, words);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_dump_text() -> String {
        let mut tokens = Vec::new();
        tokens.extend(std::iter::repeat("0".to_string()).take(NUM_CHANNELS));
        tokens.extend(std::iter::repeat("0".to_string()).take(ERASABLE_BANKS * ERASABLE_BANK_WORDS));
        tokens.push("17".to_string()); // cycle_counter
        tokens.push("1".to_string()); // extra_code
        tokens.push("1".to_string()); // allow_interrupt
        tokens.push("0".to_string()); // pend_flag
        tokens.push("0".to_string()); // pend_delay
        tokens.push("0".to_string()); // extra_delay
        tokens.push("0".to_string()); // output_channel_7
        tokens.extend(std::iter::repeat("0".to_string()).take(16)); // ch10 rows
        tokens.push("0".to_string()); // index_value
        tokens.extend(std::iter::repeat("0".to_string()).take(11)); // interrupt requests
        tokens.push("0".to_string()); // in_isr
        tokens.push("0".to_string()); // substitute_instruction
        tokens.push("0".to_string()); // downrupt_time_valid
        tokens.push("0".to_string()); // downrupt_time
        tokens.push("0".to_string()); // downlink
        tokens.join(" ")
    }

    #[test]
    fn parses_a_minimal_well_formed_dump() {
        let text = minimal_dump_text();
        let dump = parse_dump(&text).unwrap();
        assert_eq!(dump.runtime.cycle_counter, 0o17);
        assert!(dump.runtime.extra_code);
        assert!(dump.runtime.allow_interrupt);
    }

    #[test]
    fn truncated_dump_is_reported() {
        assert!(matches!(parse_dump("0 0 0"), Err(DumpLoadError::Truncated { .. })));
    }

    #[test]
    fn bad_octal_token_is_reported() {
        let mut text = minimal_dump_text();
        text = text.replacen('0', "9", 1);
        assert!(matches!(parse_dump(&text), Err(DumpLoadError::BadOctal(_))));
    }

    #[test]
    fn erasable_only_mode_preserves_register_file() {
        let mut mem = EngineMemory::new();
        mem.set_reg(crate::mem::registers::REG_A, 0o12345);
        let mut dump = parse_dump(&minimal_dump_text()).unwrap();
        dump.erasable[0][crate::mem::registers::REG_A as usize] = 0o77777;
        dump.erasable[0][0o100] = 0o4321;
        apply_to_memory(&mut mem, &dump, true);
        assert_eq!(mem.reg(crate::mem::registers::REG_A), 0o12345);
        assert_eq!(mem.reg(0o100), 0o4321);
    }
}
